//! SetRingIdsRaysNode: attaches a repeating ring id pattern to rays.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node::{ExecContext, Node, RaysInput, RaysNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::TypedBuffer;

/// Ray `i` gets ring id `ring_ids[i % ring_ids.len()]`.
pub struct SetRingIdsRaysNode {
    ring_ids: Vec<u16>,
    input: RaysInput,
    output: Option<TypedBuffer<u16>>,
}

impl SetRingIdsRaysNode {
    pub fn new(ring_ids: Vec<u16>) -> GraphResult<Self> {
        Self::check(&ring_ids)?;
        Ok(Self {
            ring_ids,
            input: RaysInput::new("SetRingIdsRays"),
            output: None,
        })
    }

    fn check(ring_ids: &[u16]) -> GraphResult<()> {
        if ring_ids.is_empty() {
            return Err(GraphError::InvalidArgument(
                "SetRingIdsRays requires at least one ring id".to_string(),
            ));
        }
        Ok(())
    }
}

impl Node for SetRingIdsRaysNode {
    fn name(&self) -> &str {
        "SetRingIdsRays"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        let ray_count = self.input.ray_count()?;
        if ray_count % self.ring_ids.len() != 0 {
            return Err(GraphError::InvalidPipeline(format!(
                "ring id count {} must divide ray count {}",
                self.ring_ids.len(),
                ray_count
            )));
        }
        self.output = Some(TypedBuffer::from_slice(&self.ring_ids, &ctx.exec.stream)?);
        Ok(())
    }

    fn enqueue_exec(&mut self, _ctx: &ExecContext) -> GraphResult<()> {
        Ok(())
    }

    fn as_rays(&self) -> Option<&dyn RaysNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::RaysSetRingIds { ring_ids } => {
                Self::check(ring_ids)?;
                self.ring_ids = ring_ids.clone();
                self.output = None;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::RaysSetRingIds {
            ring_ids: self.ring_ids.clone(),
        })
    }
}

impl RaysNode for SetRingIdsRaysNode {
    fn ray_count(&self) -> GraphResult<usize> {
        self.input.ray_count()
    }

    fn rays(&self) -> GraphResult<TypedBuffer<Mat3x4f>> {
        self.input.rays()
    }

    fn ring_ids_count(&self) -> GraphResult<usize> {
        Ok(self.ring_ids.len())
    }

    fn ring_ids(&self) -> GraphResult<Option<TypedBuffer<u16>>> {
        Ok(self.output.clone())
    }

    fn cumulative_ray_transform(&self) -> Mat3x4f {
        self.input.cumulative_ray_transform()
    }
}
