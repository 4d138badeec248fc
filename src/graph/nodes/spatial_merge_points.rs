//! SpatialMergePointsNode: concatenates the points of several inputs.

use crate::field::Field;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels;
use crate::graph::node::{check_fields, ExecContext, Node, PointsInputs, PointsNode, ValidateContext};
use crate::graph::node_type::{check_field_list, check_unique_fields, wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::Buffer;
use std::collections::BTreeMap;

/// Inputs are appended in connection order. Frames are not reconciled, so
/// inputs are expected to share one coordinate frame.
pub struct SpatialMergePointsNode {
    fields: Vec<Field>,
    inputs: PointsInputs,
    outputs: BTreeMap<Field, Buffer>,
    width: usize,
    dense: bool,
}

impl SpatialMergePointsNode {
    pub fn new(fields: Vec<Field>) -> GraphResult<Self> {
        check_field_list("SpatialMergePoints", &fields, false)?;
        check_unique_fields("SpatialMergePoints", &fields)?;
        Ok(Self {
            fields,
            inputs: PointsInputs::new("SpatialMergePoints"),
            outputs: BTreeMap::new(),
            width: 0,
            dense: true,
        })
    }
}

impl Node for SpatialMergePointsNode {
    fn name(&self) -> &str {
        "SpatialMergePoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.inputs.bind(ctx)?;
        let fields = &self.fields;
        self.inputs
            .try_map(|p| check_fields("SpatialMergePoints", p, fields))?;
        self.dense = self.inputs.try_map(|p| Ok(p.is_dense()))?.into_iter().all(|d| d);
        Ok(())
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        let mut outputs = BTreeMap::new();
        for &field in &self.fields {
            let parts = self.inputs.try_map(|p| p.field_data(field))?;
            outputs.insert(field, kernels::concat(&ctx.stream, field.element_kind(), &parts)?);
        }
        self.width = self.inputs.try_map(|p| p.point_count())?.into_iter().sum();
        self.outputs = outputs;
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsSpatialMerge { fields } => {
                check_field_list(self.name(), fields, false)?;
                check_unique_fields(self.name(), fields)?;
                self.fields = fields.clone();
                self.outputs.clear();
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsSpatialMerge {
            fields: self.fields.clone(),
        })
    }
}

impl PointsNode for SpatialMergePointsNode {
    fn required_fields(&self) -> Vec<Field> {
        self.fields.clone()
    }

    fn is_dense(&self) -> bool {
        self.dense
    }

    fn has_field(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.width)
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.inputs.look_at_origin_transform()
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
