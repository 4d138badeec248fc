//! TransformPointsNode: moves point positions into another frame.

use crate::field::{tags, Field};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels;
use crate::graph::node::{check_fields, ExecContext, Node, PointsInput, PointsNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::math::{Mat3x4f, Vec3f};
use crate::memory::{Buffer, TypedBuffer};

pub struct TransformPointsNode {
    transform: Mat3x4f,
    input: PointsInput,
    output: Option<TypedBuffer<Vec3f>>,
}

impl TransformPointsNode {
    pub fn new(transform: Mat3x4f) -> Self {
        Self {
            transform,
            input: PointsInput::new("TransformPoints"),
            output: None,
        }
    }
}

impl Node for TransformPointsNode {
    fn name(&self) -> &str {
        "TransformPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        self.input.with(|p| check_fields("TransformPoints", p, &[Field::Xyz]))
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        let xyz = self.input.field_data_typed::<tags::Xyz>()?;
        self.output = Some(kernels::transform_points(&ctx.stream, &xyz, self.transform)?);
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsTransform { transform } => {
                self.transform = *transform;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsTransform {
            transform: self.transform,
        })
    }
}

impl PointsNode for TransformPointsNode {
    fn required_fields(&self) -> Vec<Field> {
        vec![Field::Xyz]
    }

    fn is_dense(&self) -> bool {
        self.input.is_dense()
    }

    fn has_field(&self, field: Field) -> bool {
        self.input.has_field(field)
    }

    fn width(&self) -> GraphResult<usize> {
        self.input.width()
    }

    fn height(&self) -> usize {
        self.input.height()
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.input.look_at_origin_transform() * self.transform.inverse()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        if field != Field::Xyz {
            return self.input.field_data(field);
        }
        self.output
            .as_ref()
            .map(|xyz| xyz.untyped().clone())
            .ok_or_else(|| GraphError::InvalidPipeline(format!("{} has not been executed", self.name())))
    }
}
