//! FormatPointsNode: packs fields into one interleaved byte stream.
//!
//! The result is exposed as [`Field::DynamicFormat`]; its point size is the
//! sum of the listed field sizes, padding included.

use crate::field::Field;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels::{self, PackColumn};
use crate::graph::node::{check_fields, ExecContext, Node, PointsInput, PointsNode, ValidateContext};
use crate::graph::node_type::{check_field_list, wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::Buffer;

pub struct FormatPointsNode {
    fields: Vec<Field>,
    input: PointsInput,
    output: Option<Buffer>,
}

impl FormatPointsNode {
    pub fn new(fields: Vec<Field>) -> GraphResult<Self> {
        check_field_list("FormatPoints", &fields, true)?;
        Ok(Self {
            fields,
            input: PointsInput::new("FormatPoints"),
            output: None,
        })
    }

    /// Bytes per formatted point.
    pub fn point_size(&self) -> usize {
        self.fields.iter().map(|f| f.size()).sum()
    }
}

impl Node for FormatPointsNode {
    fn name(&self) -> &str {
        "FormatPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        self.input.with(|p| check_fields("FormatPoints", p, &self.fields))
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        let count = self.input.point_count()?;
        let mut columns = Vec::with_capacity(self.fields.len());
        for &field in &self.fields {
            if field.is_padding() {
                columns.push(PackColumn {
                    source: None,
                    size: field.size(),
                });
                continue;
            }
            let data = self.input.field_data(field)?;
            if !data.is_device_accessible() {
                return Err(GraphError::FieldNotDeviceAccessible {
                    node: self.name().to_string(),
                    field,
                });
            }
            columns.push(PackColumn {
                source: Some(data.device_read()?),
                size: field.size(),
            });
        }
        self.output = Some(kernels::pack_fields(&ctx.stream, columns, count)?);
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsFormat { fields } => {
                check_field_list(self.name(), fields, true)?;
                self.fields = fields.clone();
                self.output = None;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsFormat {
            fields: self.fields.clone(),
        })
    }
}

impl PointsNode for FormatPointsNode {
    fn required_fields(&self) -> Vec<Field> {
        self.fields.iter().copied().filter(|f| !f.is_padding()).collect()
    }

    fn is_dense(&self) -> bool {
        self.input.is_dense()
    }

    fn has_field(&self, field: Field) -> bool {
        field == Field::DynamicFormat || self.input.has_field(field)
    }

    fn width(&self) -> GraphResult<usize> {
        self.input.width()
    }

    fn height(&self) -> usize {
        self.input.height()
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.input.look_at_origin_transform()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        if field != Field::DynamicFormat {
            return self.input.field_data(field);
        }
        self.output
            .clone()
            .ok_or_else(|| GraphError::InvalidPipeline(format!("{} has not been executed", self.name())))
    }

    fn field_point_size(&self, field: Field) -> usize {
        if field == Field::DynamicFormat {
            self.point_size()
        } else {
            field.size()
        }
    }
}
