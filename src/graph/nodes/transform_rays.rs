//! TransformRaysNode: moves rays into another frame.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels;
use crate::graph::node::{ExecContext, Node, RaysInput, RaysNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::TypedBuffer;

pub struct TransformRaysNode {
    transform: Mat3x4f,
    input: RaysInput,
    output: Option<TypedBuffer<Mat3x4f>>,
}

impl TransformRaysNode {
    pub fn new(transform: Mat3x4f) -> Self {
        Self {
            transform,
            input: RaysInput::new("TransformRays"),
            output: None,
        }
    }
}

impl Node for TransformRaysNode {
    fn name(&self) -> &str {
        "TransformRays"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        let rays = self.input.rays()?;
        self.output = Some(kernels::transform_rays(&ctx.stream, &rays, self.transform)?);
        Ok(())
    }

    fn as_rays(&self) -> Option<&dyn RaysNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::RaysTransform { transform } => {
                self.transform = *transform;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::RaysTransform {
            transform: self.transform,
        })
    }
}

impl RaysNode for TransformRaysNode {
    fn ray_count(&self) -> GraphResult<usize> {
        self.input.ray_count()
    }

    fn rays(&self) -> GraphResult<TypedBuffer<Mat3x4f>> {
        self.output.clone().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} has not been executed", self.name()))
        })
    }

    fn ring_ids_count(&self) -> GraphResult<usize> {
        self.input.ring_ids_count()
    }

    fn ring_ids(&self) -> GraphResult<Option<TypedBuffer<u16>>> {
        self.input.ring_ids()
    }

    fn cumulative_ray_transform(&self) -> Mat3x4f {
        self.transform * self.input.cumulative_ray_transform()
    }
}
