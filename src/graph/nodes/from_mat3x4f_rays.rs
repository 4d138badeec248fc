//! FromMat3x4fRaysNode: source of ray poses given by the user.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node::{ExecContext, Node, RaysNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::math::Mat3x4f;
use crate::memory::TypedBuffer;

/// Each ray is a pose: origin = translation, direction = local +Z.
pub struct FromMat3x4fRaysNode {
    rays: Vec<Mat3x4f>,
    output: Option<TypedBuffer<Mat3x4f>>,
}

impl FromMat3x4fRaysNode {
    pub fn new(rays: Vec<Mat3x4f>) -> Self {
        Self { rays, output: None }
    }
}

impl Node for FromMat3x4fRaysNode {
    fn name(&self) -> &str {
        "FromMat3x4fRays"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        if !ctx.inputs.is_empty() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} accepts no inputs, got {}",
                self.name(),
                ctx.inputs.len()
            )));
        }
        // New buffer per configuration; consumers may still hold the old one
        self.output = Some(TypedBuffer::from_slice(&self.rays, &ctx.exec.stream)?);
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
            NodeSpec::RaysFromMat3x4f { rays } => {
                self.rays = rays.clone();
                self.output = None;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::RaysFromMat3x4f {
            rays: self.rays.clone(),
        })
    }
}

impl RaysNode for FromMat3x4fRaysNode {
    fn ray_count(&self) -> GraphResult<usize> {
        Ok(self.rays.len())
    }

    fn rays(&self) -> GraphResult<TypedBuffer<Mat3x4f>> {
        self.output.clone().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} has not been validated", self.name()))
        })
    }
}
