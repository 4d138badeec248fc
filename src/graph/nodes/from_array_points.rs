//! FromArrayPointsNode: points supplied by the user as packed rows.

use crate::field::Field;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node::{ExecContext, Node, PointsNode, ValidateContext};
use crate::graph::node_type::{check_field_list, check_unique_fields, wrong_spec, NodeSpec};
use crate::memory::Buffer;
use std::collections::BTreeMap;

/// Each row holds `fields` back to back (padding included). The output is
/// dense unless `IS_HIT` is among the fields.
#[derive(Debug)]
pub struct FromArrayPointsNode {
    fields: Vec<Field>,
    data: Vec<u8>,
    outputs: BTreeMap<Field, Buffer>,
}

impl FromArrayPointsNode {
    pub fn new(fields: Vec<Field>, data: Vec<u8>) -> GraphResult<Self> {
        Self::check(&fields, &data)?;
        Ok(Self {
            fields,
            data,
            outputs: BTreeMap::new(),
        })
    }

    fn check(fields: &[Field], data: &[u8]) -> GraphResult<()> {
        check_field_list("FromArrayPoints", fields, true)?;
        check_unique_fields("FromArrayPoints", fields)?;
        let row = row_size(fields);
        if data.len() % row != 0 {
            return Err(GraphError::InvalidArgument(format!(
                "FromArrayPoints data length {} is not a multiple of the row size {}",
                data.len(),
                row
            )));
        }
        Ok(())
    }

    fn point_total(&self) -> usize {
        self.data.len() / row_size(&self.fields)
    }

    /// Split rows into one contiguous column per field.
    fn columns(&self) -> BTreeMap<Field, Vec<u8>> {
        let row = row_size(&self.fields);
        let mut columns: BTreeMap<Field, Vec<u8>> = BTreeMap::new();
        let mut offset = 0;
        for &field in &self.fields {
            let size = field.size();
            if !field.is_padding() {
                let column = columns.entry(field).or_default();
                for chunk in self.data.chunks_exact(row) {
                    column.extend_from_slice(&chunk[offset..offset + size]);
                }
            }
            offset += size;
        }
        columns
    }
}

fn row_size(fields: &[Field]) -> usize {
    fields.iter().map(|f| f.size()).sum()
}

impl Node for FromArrayPointsNode {
    fn name(&self) -> &str {
        "FromArrayPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        if !ctx.inputs.is_empty() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} accepts no inputs, got {}",
                self.name(),
                ctx.inputs.len()
            )));
        }
        let mut outputs = BTreeMap::new();
        for (field, bytes) in self.columns() {
            let buffer = Buffer::new(field.element_kind(), &ctx.exec.stream);
            buffer.set_data(&bytes)?;
            outputs.insert(field, buffer);
        }
        self.outputs = outputs;
        Ok(())
    }

    fn enqueue_exec(&mut self, _ctx: &ExecContext) -> GraphResult<()> {
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsFromArray { fields, data } => {
                Self::check(fields, data)?;
                self.fields = fields.clone();
                self.data = data.clone();
                self.outputs.clear();
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsFromArray {
            fields: self.fields.clone(),
            data: self.data.clone(),
        })
    }
}

impl PointsNode for FromArrayPointsNode {
    fn is_dense(&self) -> bool {
        !self.fields.contains(&Field::IsHit)
    }

    fn has_field(&self, field: Field) -> bool {
        !field.is_padding() && self.fields.contains(&field)
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.point_total())
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        self.outputs
            .get(&field)
            .cloned()
            .ok_or_else(|| GraphError::FieldMissing {
                node: self.name().to_string(),
                field,
            })
    }
}
