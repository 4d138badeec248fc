//! CompactPointsNode: drops non-hit points.
//!
//! The number of hits is read back on the host during execute, which makes
//! this node a synchronization point of the stream.

use crate::field::{tags, Field};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels;
use crate::graph::node::{ExecContext, Node, PointsInput, PointsNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::graph::nodes::filtered::FilteredFields;
use crate::math::Mat3x4f;
use crate::memory::Buffer;

pub struct CompactPointsNode {
    input: PointsInput,
    outputs: FilteredFields,
}

impl CompactPointsNode {
    pub fn new() -> Self {
        Self {
            input: PointsInput::new("CompactPoints"),
            outputs: FilteredFields::new("CompactPoints"),
        }
    }

    /// Fields memoized for the current pass.
    pub fn cached_fields(&self) -> Vec<Field> {
        self.outputs.cached_fields()
    }
}

impl Default for CompactPointsNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for CompactPointsNode {
    fn name(&self) -> &str {
        "CompactPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        if !self.input.has_field(Field::IsHit) {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires {} from its input",
                self.name(),
                Field::IsHit
            )));
        }
        self.outputs.reset();
        Ok(())
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        self.outputs.begin_pass(&ctx.stream);

        let is_hit = self.input.field_data_typed::<tags::IsHit>()?;
        let (indices, count) = kernels::compact_indices(&ctx.stream, &is_hit)?;

        // Host read synchronizes the stream
        let kept = count.get(0)? as usize;
        indices.resize_with(kept, true, false)?;
        tracing::debug!("CompactPoints kept {} of {} points", kept, is_hit.count());

        self.outputs.set_indices(indices);
        self.outputs.materialize_all(&self.input)
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::PointsCompact => Ok(()),
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::PointsCompact)
    }
}

impl PointsNode for CompactPointsNode {
    fn is_dense(&self) -> bool {
        true
    }

    fn has_field(&self, field: Field) -> bool {
        self.input.has_field(field)
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.outputs.width())
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.input.look_at_origin_transform()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        self.outputs.field_data(&self.input, field)
    }
}
