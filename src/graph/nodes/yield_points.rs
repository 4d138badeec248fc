//! YieldPointsNode: pins a set of fields as results of a branch.

use crate::field::Field;
use crate::graph::error::GraphResult;
use crate::graph::node::{check_fields, ExecContext, Node, PointsInput, PointsNode, ValidateContext};
use crate::graph::node_type::{check_field_list, check_unique_fields, wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::Buffer;
use std::collections::BTreeMap;

/// Pulls `fields` from its input on every execute and keeps the buffers,
/// so they stay queryable without reaching upstream.
pub struct YieldPointsNode {
    fields: Vec<Field>,
    input: PointsInput,
    yielded: BTreeMap<Field, Buffer>,
}

impl YieldPointsNode {
    pub fn new(fields: Vec<Field>) -> GraphResult<Self> {
        check_field_list("YieldPoints", &fields, false)?;
        check_unique_fields("YieldPoints", &fields)?;
        Ok(Self {
            fields,
            input: PointsInput::new("YieldPoints"),
            yielded: BTreeMap::new(),
        })
    }
}

impl Node for YieldPointsNode {
    fn name(&self) -> &str {
        "YieldPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        self.yielded.clear();
        self.input.with(|p| check_fields("YieldPoints", p, &self.fields))
    }

    fn enqueue_exec(&mut self, _ctx: &ExecContext) -> GraphResult<()> {
        let mut yielded = BTreeMap::new();
        for &field in &self.fields {
            yielded.insert(field, self.input.field_data(field)?);
        }
        self.yielded = yielded;
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsYield { fields } => {
                check_field_list(self.name(), fields, false)?;
                check_unique_fields(self.name(), fields)?;
                self.fields = fields.clone();
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsYield {
            fields: self.fields.clone(),
        })
    }
}

impl PointsNode for YieldPointsNode {
    fn required_fields(&self) -> Vec<Field> {
        self.fields.clone()
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
        self.input.look_at_origin_transform()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        match self.yielded.get(&field) {
            Some(buffer) => Ok(buffer.clone()),
            None => self.input.field_data(field),
        }
    }
}
