//! Node abstraction for the graph.
//!
//! Every node implements [`Node`] (lifecycle) and exposes its outputs through
//! one of the description interfaces:
//! - **[`RaysNode`]**: produces ray poses and optional ring ids.
//! - **[`PointsNode`]**: produces per-point fields.
//!
//! Nodes are shared as [`NodeRef`]s. A child captures references to its
//! inputs while validating; the graph arena only keeps adjacency lists.

use crate::field::{Field, FieldTag};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node_type::NodeSpec;
use crate::graph::scene::SceneBinding;
use crate::math::Mat3x4f;
use crate::memory::{Buffer, Device, Stream, TypedBuffer};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared, lockable handle to a node.
pub type NodeRef = Arc<RwLock<dyn Node>>;

pub fn read_node(node: &NodeRef) -> RwLockReadGuard<'_, dyn Node + 'static> {
    node.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_node(node: &NodeRef) -> RwLockWriteGuard<'_, dyn Node + 'static> {
    node.write().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle state tracked by the graph for every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unconfigured,
    Validated,
    Executed,
}

/// Device resources shared by every node of a graph run.
#[derive(Clone, Debug)]
pub struct ExecContext {
    pub stream: Stream,
    pub scene: Option<SceneBinding>,
}

impl ExecContext {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            scene: None,
        }
    }

    pub fn device(&self) -> &Device {
        self.stream.device()
    }
}

/// What a node sees while validating: its inputs in connection order.
pub struct ValidateContext<'a> {
    pub inputs: &'a [NodeRef],
    pub exec: &'a ExecContext,
}

/// A vertex of the processing graph.
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    /// Check structural preconditions and capture inputs.
    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()>;

    /// Issue this node's work for the current run.
    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()>;

    fn as_points(&self) -> Option<&dyn PointsNode> {
        None
    }

    fn as_rays(&self) -> Option<&dyn RaysNode> {
        None
    }

    /// Apply new parameters; the node must come out equivalent to one
    /// freshly built from `spec`.
    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        Err(GraphError::InvalidArgument(format!(
            "{} cannot be reconfigured with {}",
            self.name(),
            spec.kind_name()
        )))
    }

    /// Explicit arguments that rebuild this node, if it is a built-in.
    fn spec(&self) -> Option<NodeSpec> {
        None
    }
}

/// Producer of rays.
pub trait RaysNode: Send + Sync {
    fn ray_count(&self) -> GraphResult<usize>;

    fn rays(&self) -> GraphResult<TypedBuffer<Mat3x4f>>;

    fn ring_ids_count(&self) -> GraphResult<usize> {
        Ok(0)
    }

    fn ring_ids(&self) -> GraphResult<Option<TypedBuffer<u16>>> {
        Ok(None)
    }

    /// Transform accumulated by ray transform nodes upstream.
    fn cumulative_ray_transform(&self) -> Mat3x4f {
        Mat3x4f::identity()
    }
}

/// Producer of point fields.
pub trait PointsNode: Send + Sync {
    fn required_fields(&self) -> Vec<Field> {
        Vec::new()
    }

    /// Whether every point slot is an actual sample.
    fn is_dense(&self) -> bool;

    fn has_field(&self, field: Field) -> bool;

    fn width(&self) -> GraphResult<usize>;

    fn height(&self) -> usize {
        1
    }

    fn point_count(&self) -> GraphResult<usize> {
        Ok(self.width()? * self.height())
    }

    /// Transform from the point frame to the sensor origin.
    fn look_at_origin_transform(&self) -> Mat3x4f {
        Mat3x4f::identity()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer>;

    /// Bytes per point of `field`; formatted outputs override this.
    fn field_point_size(&self, field: Field) -> usize {
        field.size()
    }
}

impl dyn PointsNode + '_ {
    /// Field data viewed through its compile-time element type.
    pub fn field_data_typed<T: FieldTag>(&self) -> GraphResult<TypedBuffer<T::Elem>> {
        Ok(TypedBuffer::from_untyped(self.field_data(T::FIELD)?)?)
    }
}

/// Ensure `node` produces every field in `fields`.
pub fn check_fields(owner: &str, node: &dyn PointsNode, fields: &[Field]) -> GraphResult<()> {
    for &field in fields {
        if !field.is_padding() && !node.has_field(field) {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires {} which its input does not provide",
                owner, field
            )));
        }
    }
    Ok(())
}

/// Single points input; forwards description queries upstream.
#[derive(Clone)]
pub struct PointsInput {
    owner: &'static str,
    node: Option<NodeRef>,
}

impl PointsInput {
    pub fn new(owner: &'static str) -> Self {
        Self { owner, node: None }
    }

    /// Capture the only input, which must produce points.
    pub fn bind(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        let node = match ctx.inputs {
            [only] => only.clone(),
            other => {
                return Err(GraphError::InvalidPipeline(format!(
                    "{} requires exactly one input, got {}",
                    self.owner,
                    other.len()
                )))
            }
        };
        if read_node(&node).as_points().is_none() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires a points input, got {}",
                self.owner,
                read_node(&node).name()
            )));
        }
        self.node = Some(node);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.node.is_some()
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn PointsNode) -> GraphResult<R>) -> GraphResult<R> {
        let node = self.node.as_ref().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} has no validated input", self.owner))
        })?;
        let guard = read_node(node);
        let points = guard.as_points().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} input no longer produces points", self.owner))
        })?;
        f(points)
    }

    pub fn is_dense(&self) -> bool {
        self.with(|p| Ok(p.is_dense())).unwrap_or(false)
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.with(|p| Ok(p.has_field(field))).unwrap_or(false)
    }

    pub fn width(&self) -> GraphResult<usize> {
        self.with(|p| p.width())
    }

    pub fn height(&self) -> usize {
        self.with(|p| Ok(p.height())).unwrap_or(1)
    }

    pub fn point_count(&self) -> GraphResult<usize> {
        self.with(|p| p.point_count())
    }

    pub fn look_at_origin_transform(&self) -> Mat3x4f {
        self.with(|p| Ok(p.look_at_origin_transform()))
            .unwrap_or_else(|_| Mat3x4f::identity())
    }

    pub fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        self.with(|p| p.field_data(field))
    }

    pub fn field_data_typed<T: FieldTag>(&self) -> GraphResult<TypedBuffer<T::Elem>> {
        self.with(|p| p.field_data_typed::<T>())
    }

    pub fn field_point_size(&self, field: Field) -> usize {
        self.with(|p| Ok(p.field_point_size(field)))
            .unwrap_or_else(|_| field.size())
    }
}

/// Several points inputs, e.g. for merging.
#[derive(Clone)]
pub struct PointsInputs {
    owner: &'static str,
    nodes: Vec<NodeRef>,
}

impl PointsInputs {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            nodes: Vec::new(),
        }
    }

    pub fn bind(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        if ctx.inputs.is_empty() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires at least one input",
                self.owner
            )));
        }
        for node in ctx.inputs {
            let guard = read_node(node);
            if guard.as_points().is_none() {
                return Err(GraphError::InvalidPipeline(format!(
                    "{} requires points inputs, got {}",
                    self.owner,
                    guard.name()
                )));
            }
        }
        self.nodes = ctx.inputs.to_vec();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Apply `f` to every input in connection order.
    pub fn try_map<R>(&self, mut f: impl FnMut(&dyn PointsNode) -> GraphResult<R>) -> GraphResult<Vec<R>> {
        self.nodes
            .iter()
            .map(|node| {
                let guard = read_node(node);
                let points = guard.as_points().ok_or_else(|| {
                    GraphError::InvalidPipeline(format!("{} input no longer produces points", self.owner))
                })?;
                f(points)
            })
            .collect()
    }

    /// Per-input frames cannot be combined, so the merged frame is identity.
    pub fn look_at_origin_transform(&self) -> Mat3x4f {
        Mat3x4f::identity()
    }
}

/// Single rays input.
#[derive(Clone)]
pub struct RaysInput {
    owner: &'static str,
    node: Option<NodeRef>,
}

impl RaysInput {
    pub fn new(owner: &'static str) -> Self {
        Self { owner, node: None }
    }

    pub fn bind(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        let node = match ctx.inputs {
            [only] => only.clone(),
            other => {
                return Err(GraphError::InvalidPipeline(format!(
                    "{} requires exactly one input, got {}",
                    self.owner,
                    other.len()
                )))
            }
        };
        if read_node(&node).as_rays().is_none() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires a rays input, got {}",
                self.owner,
                read_node(&node).name()
            )));
        }
        self.node = Some(node);
        Ok(())
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn RaysNode) -> GraphResult<R>) -> GraphResult<R> {
        let node = self.node.as_ref().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} has no validated input", self.owner))
        })?;
        let guard = read_node(node);
        let rays = guard.as_rays().ok_or_else(|| {
            GraphError::InvalidPipeline(format!("{} input no longer produces rays", self.owner))
        })?;
        f(rays)
    }

    pub fn ray_count(&self) -> GraphResult<usize> {
        self.with(|r| r.ray_count())
    }

    pub fn rays(&self) -> GraphResult<TypedBuffer<Mat3x4f>> {
        self.with(|r| r.rays())
    }

    pub fn ring_ids_count(&self) -> GraphResult<usize> {
        self.with(|r| r.ring_ids_count())
    }

    pub fn ring_ids(&self) -> GraphResult<Option<TypedBuffer<u16>>> {
        self.with(|r| r.ring_ids())
    }

    pub fn cumulative_ray_transform(&self) -> Mat3x4f {
        self.with(|r| Ok(r.cumulative_ray_transform()))
            .unwrap_or_else(|_| Mat3x4f::identity())
    }
}
