//! Graph executor: owns the node arena and drives runs.
//!
//! A run of node `N`:
//! 1. Recompile the plan for `N`'s connected component if the graph changed.
//! 2. Validate every `Unconfigured` node in topological order.
//! 3. Enqueue every scheduled node once on the graph's stream.
//!
//! Work is only enqueued; host-side blocking happens where results are read.

use crate::config::{DeviceConfig, RuntimeConfig};
use crate::field::{Field, FieldTag};
use crate::graph::compiled_plan::CompiledPlan;
use crate::graph::compiler::GraphCompiler;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::NodeId;
use crate::graph::node::{
    read_node, write_node, ExecContext, Node, NodeRef, NodeState, PointsNode, ValidateContext,
};
use crate::graph::node_type::{NodeFactory, NodeSpec};
use crate::graph::scene::SceneBinding;
use crate::memory::{Device, Stream};
use crate::tape::{Tape, TapeCall};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

/// Arena entry: a node plus its adjacency and lifecycle bookkeeping.
pub struct NodeSlot {
    pub(crate) node: NodeRef,
    pub(crate) name: String,
    /// Inputs in connection order.
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) state: NodeState,
    pub(crate) active: bool,
    pub(crate) exec_count: u64,
    /// Stream sequence number at the start of the run that last executed it
    pub(crate) run_mark: u64,
}

impl NodeSlot {
    pub(crate) fn new(node: NodeRef) -> Self {
        let name = read_node(&node).name().to_string();
        Self {
            node,
            name,
            parents: Vec::new(),
            children: Vec::new(),
            state: NodeState::Unconfigured,
            active: true,
            exec_count: 0,
            run_mark: 0,
        }
    }
}

/// Typed handle to a node added with [`Graph::add_node`].
pub struct NodeHandle<N> {
    id: NodeId,
    node: Arc<RwLock<N>>,
}

impl<N> NodeHandle<N> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read access to the concrete node, e.g. for node-specific accessors.
    pub fn read(&self) -> RwLockReadGuard<'_, N> {
        self.node.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<N> Clone for NodeHandle<N> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            node: Arc::clone(&self.node),
        }
    }
}

impl<N> std::fmt::Debug for NodeHandle<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle").field("id", &self.id).finish()
    }
}

/// Summary of one [`Graph::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub target: NodeId,
    pub generation: u64,
    /// Nodes in the execution order
    pub scheduled: usize,
    /// Nodes that had to be (re)validated
    pub validated: usize,
    pub executed: usize,
    /// Component nodes left out as inactive
    pub skipped: usize,
    pub elapsed_us: u64,
}

/// The processing graph.
pub struct Graph {
    nodes: Vec<Option<NodeSlot>>,
    ctx: ExecContext,
    /// Generation counter for plan invalidation
    generation: u64,
    /// Cached plan of the last run target
    compiled_plan: Option<CompiledPlan>,
    recorder: Option<Vec<TapeCall>>,
}

impl Graph {
    /// Graph on a fresh unlimited device.
    pub fn new() -> GraphResult<Self> {
        Ok(Self::with_stream(Stream::new(Device::new(), "sensorgraph")?))
    }

    pub fn with_stream(stream: Stream) -> Self {
        Self {
            nodes: Vec::new(),
            ctx: ExecContext::new(stream),
            generation: 0,
            compiled_plan: None,
            recorder: None,
        }
    }

    /// Graph on a device built from `config`.
    pub fn from_config(config: &DeviceConfig) -> GraphResult<Self> {
        let limit = config.memory_limit_bytes.map(|bytes| bytes as usize);
        let stream = Stream::new(Device::with_limit(limit), config.stream_name.clone())?;
        Ok(Self::with_stream(stream))
    }

    /// Graph from a full runtime config; recording starts if configured.
    pub fn from_runtime_config(config: &RuntimeConfig) -> GraphResult<Self> {
        let mut graph = Self::from_config(&config.device)?;
        if config.tape.record_on_start {
            graph.start_recording();
        }
        Ok(graph)
    }

    pub fn stream(&self) -> &Stream {
        &self.ctx.stream
    }

    pub fn device(&self) -> &Device {
        self.ctx.device()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Plan of the most recent run, if any.
    pub fn compiled_plan(&self) -> Option<&CompiledPlan> {
        self.compiled_plan.as_ref()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    // ── Graph building ──

    /// Add a custom node. Nodes added this way cannot be replayed from a tape.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> NodeHandle<N> {
        let node = Arc::new(RwLock::new(node));
        let node_ref: NodeRef = node.clone();
        let id = self.insert_slot(node_ref);

        if self.recorder.is_some() {
            let name = self.slot_name(id);
            tracing::warn!("Recording custom node '{}' ({}); it cannot be replayed", name, id);
            self.record(TapeCall::Unreplayable { node: id, name });
        }

        NodeHandle { id, node }
    }

    /// Create a built-in node from its description.
    pub fn create_node(&mut self, spec: NodeSpec) -> GraphResult<NodeId> {
        let node = NodeFactory::create(&spec)?;
        let id = self.insert_slot(node);
        tracing::debug!("Created node {} ({})", id, spec);
        self.record(TapeCall::CreateNode { node: id, spec });
        Ok(id)
    }

    fn insert_slot(&mut self, node: NodeRef) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeSlot::new(node)));
        self.generation += 1;
        id
    }

    /// Replace the parameters of a built-in node.
    ///
    /// The node is left equivalent to one created from `spec`; it and its
    /// descendants are re-validated on the next run.
    pub fn set_parameters(&mut self, id: NodeId, spec: NodeSpec) -> GraphResult<()> {
        let node = self.slot(id)?.node.clone();
        write_node(&node).reconfigure(&spec)?;
        let name = read_node(&node).name().to_string();
        self.slot_mut(id)?.name = name;
        self.invalidate_from(id);
        self.record(TapeCall::SetParameters { node: id, spec });
        Ok(())
    }

    /// Mutate a custom node in place, then invalidate it and its descendants.
    pub fn configure<N: Node + 'static, R>(
        &mut self,
        handle: &NodeHandle<N>,
        f: impl FnOnce(&mut N) -> GraphResult<R>,
    ) -> GraphResult<R> {
        self.slot(handle.id)?;
        let result = {
            let mut node = handle.node.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut *node)?
        };
        self.invalidate_from(handle.id);
        if self.recorder.is_some() {
            tracing::warn!("Configuring custom node {} is not recorded", handle.id);
        }
        Ok(result)
    }

    /// Connect `child` as the next input of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> GraphResult<()> {
        self.slot(parent)?;
        self.slot(child)?;

        if parent == child {
            return Err(GraphError::InvalidArgument(format!(
                "cannot connect node {} to itself",
                parent
            )));
        }
        if self.slot(parent)?.children.contains(&child) {
            return Err(GraphError::AlreadyConnected { parent, child });
        }
        if GraphCompiler::would_create_cycle(&self.nodes, parent, child) {
            return Err(GraphError::CycleDetected { parent, child });
        }

        self.slot_mut(parent)?.children.push(child);
        self.slot_mut(child)?.parents.push(parent);
        self.invalidate_from(child);
        self.record(TapeCall::AddChild { parent, child });
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> GraphResult<()> {
        self.slot(child)?;
        let parent_slot = self.slot_mut(parent)?;
        let Some(pos) = parent_slot.children.iter().position(|&c| c == child) else {
            return Err(GraphError::NotConnected { parent, child });
        };
        parent_slot.children.remove(pos);
        self.slot_mut(child)?.parents.retain(|&p| p != parent);
        self.invalidate_from(child);
        self.record(TapeCall::RemoveChild { parent, child });
        Ok(())
    }

    /// Inactive nodes and their descendants are scheduled as if removed.
    pub fn set_active(&mut self, id: NodeId, active: bool) -> GraphResult<()> {
        let slot = self.slot_mut(id)?;
        if slot.active != active {
            slot.active = active;
            self.invalidate_from(id);
        }
        self.record(TapeCall::SetActive { node: id, active });
        Ok(())
    }

    pub fn is_active(&self, id: NodeId) -> GraphResult<bool> {
        Ok(self.slot(id)?.active)
    }

    /// Remove a node, detaching it from its parents and children.
    pub fn destroy_node(&mut self, id: NodeId) -> GraphResult<()> {
        self.slot(id)?;
        self.invalidate_from(id);

        let Some(slot) = self.nodes[id.index()].take() else {
            return Err(GraphError::NodeNotFound(id));
        };
        for parent in &slot.parents {
            if let Some(Some(p)) = self.nodes.get_mut(parent.index()) {
                p.children.retain(|&c| c != id);
            }
        }
        for child in &slot.children {
            if let Some(Some(c)) = self.nodes.get_mut(child.index()) {
                c.parents.retain(|&p| p != id);
            }
        }

        tracing::debug!("Destroyed node {} ('{}')", id, slot.name);
        self.record(TapeCall::DestroyNode { node: id });
        Ok(())
    }

    /// Bind the scene traced by raytrace nodes. Every node re-validates.
    pub fn bind_scene(&mut self, scene: SceneBinding) {
        self.ctx.scene = Some(scene);
        for slot in self.nodes.iter_mut().flatten() {
            slot.state = NodeState::Unconfigured;
        }
        self.generation += 1;
    }

    pub fn parents(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        Ok(self.slot(id)?.parents.clone())
    }

    pub fn children(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        Ok(self.slot(id)?.children.clone())
    }

    /// Shared reference to the node itself.
    pub fn node(&self, id: NodeId) -> GraphResult<NodeRef> {
        Ok(self.slot(id)?.node.clone())
    }

    /// Lifecycle state. An executed node whose run hit a kernel failure
    /// reports `Unconfigured`.
    pub fn node_state(&self, id: NodeId) -> GraphResult<NodeState> {
        let slot = self.slot(id)?;
        if self.faulted(slot) {
            return Ok(NodeState::Unconfigured);
        }
        Ok(slot.state)
    }

    /// How many times the node has been executed.
    pub fn execution_count(&self, id: NodeId) -> GraphResult<u64> {
        Ok(self.slot(id)?.exec_count)
    }

    // ── Running ──

    /// Run the connected component containing `id`.
    pub fn run(&mut self, id: NodeId) -> GraphResult<RunReport> {
        self.slot(id)?;
        let start_time = Instant::now();

        self.invalidate_faulted();
        let run_mark = self.ctx.stream.launched_kernels();
        let plan = self.recompile_if_needed(id);
        if !plan.schedules_target() {
            return Err(GraphError::InvalidArgument(format!(
                "node {} is inactive or downstream of an inactive node",
                id
            )));
        }

        // Validation: nothing is enqueued unless the whole plan validates
        let mut validated = 0;
        for &idx in &plan.order {
            let Some(slot) = &self.nodes[idx] else {
                continue;
            };
            if slot.state != NodeState::Unconfigured {
                continue;
            }
            let inputs = self.input_refs(slot);
            let node = slot.node.clone();
            let result = write_node(&node).validate(&ValidateContext {
                inputs: &inputs,
                exec: &self.ctx,
            });
            if let Err(e) = result {
                tracing::debug!("Validation of {} ('{}') failed: {}", idx, slot.name, e);
                return Err(e);
            }
            if let Some(slot) = self.nodes[idx].as_mut() {
                slot.state = NodeState::Validated;
            }
            validated += 1;
        }

        for &idx in &plan.order {
            if let Some(slot) = self.nodes[idx].as_mut() {
                slot.state = NodeState::Validated;
            }
        }

        // Execution
        let mut executed = 0;
        for &idx in &plan.order {
            let Some(slot) = &self.nodes[idx] else {
                continue;
            };
            let node = slot.node.clone();
            tracing::debug!("Executing {} ('{}')", idx, slot.name);

            let result = write_node(&node).enqueue_exec(&self.ctx);
            if let Err(e) = result {
                tracing::debug!("Execution of {} ('{}') failed: {}", idx, slot.name, e);
                for failed in GraphCompiler::descendants(&self.nodes, NodeId(idx as u32)) {
                    if let Some(slot) = self.nodes[failed].as_mut() {
                        slot.state = NodeState::Unconfigured;
                    }
                }
                return Err(e);
            }

            if let Some(slot) = self.nodes[idx].as_mut() {
                slot.state = NodeState::Executed;
                slot.exec_count += 1;
                slot.run_mark = run_mark;
            }
            executed += 1;
        }

        let report = RunReport {
            target: id,
            generation: plan.generation,
            scheduled: plan.order.len(),
            validated,
            executed,
            skipped: plan.skipped.len(),
            elapsed_us: start_time.elapsed().as_micros() as u64,
        };
        tracing::debug!(
            "Run of {} done: {} executed, {} validated, {} skipped in {}us",
            id,
            report.executed,
            report.validated,
            report.skipped,
            report.elapsed_us
        );
        self.record(TapeCall::Run { node: id });
        Ok(report)
    }

    /// Block until all enqueued work finished, surfacing kernel failures.
    pub fn synchronize(&self) -> GraphResult<()> {
        Ok(self.ctx.stream.synchronize()?)
    }

    /// Recompile the plan if the target or graph changed (lazy recompilation).
    fn recompile_if_needed(&mut self, target: NodeId) -> CompiledPlan {
        if let Some(plan) = &self.compiled_plan {
            if plan.is_current(target, self.generation) {
                return plan.clone();
            }
        }

        let plan = GraphCompiler::compile(&self.nodes, target, self.generation);
        tracing::info!(
            "Graph recompiled for {}: {} scheduled / {} in component / {} total (gen {})",
            target,
            plan.stats.scheduled_nodes,
            plan.stats.component_nodes,
            plan.stats.total_nodes,
            plan.generation,
        );
        for &idx in &plan.skipped {
            if let Some(slot) = &self.nodes[idx] {
                tracing::debug!("Skipping inactive node {} ('{}')", idx, slot.name);
            }
        }

        self.compiled_plan = Some(plan.clone());
        plan
    }

    fn input_refs(&self, slot: &NodeSlot) -> Vec<NodeRef> {
        slot.parents
            .iter()
            .filter_map(|p| self.nodes.get(p.index()).and_then(Option::as_ref))
            .map(|p| p.node.clone())
            .collect()
    }

    /// Whether the run that executed this node had device work fail or skipped.
    fn faulted(&self, slot: &NodeSlot) -> bool {
        slot.state == NodeState::Executed && self.ctx.stream.faulted_since(slot.run_mark)
    }

    /// Send nodes whose last run faulted back through validation.
    fn invalidate_faulted(&mut self) {
        let faulted: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|slot| (idx, slot)))
            .filter(|(_, slot)| self.faulted(slot))
            .map(|(idx, _)| NodeId(idx as u32))
            .collect();
        for id in faulted {
            tracing::debug!("Results of {} were lost to a kernel failure", id);
            self.invalidate_from(id);
        }
    }

    /// Mark `id` and everything downstream for re-validation.
    fn invalidate_from(&mut self, id: NodeId) {
        for idx in GraphCompiler::descendants(&self.nodes, id) {
            if let Some(slot) = self.nodes[idx].as_mut() {
                slot.state = NodeState::Unconfigured;
            }
        }
        self.generation += 1;
    }

    // ── Results ──

    fn executed_points<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&dyn PointsNode) -> GraphResult<R>,
    ) -> GraphResult<R> {
        let slot = self.slot(id)?;
        if slot.state != NodeState::Executed {
            return Err(GraphError::ResultsUnavailable(id));
        }
        let guard = read_node(&slot.node);
        let points = guard.as_points().ok_or_else(|| {
            GraphError::InvalidArgument(format!("node {} ('{}') does not produce points", id, slot.name))
        })?;
        f(points)
    }

    /// Make sure the node's run did not fault. Called after the buffer read,
    /// which has synchronised if it needed device data.
    fn ensure_intact(&self, id: NodeId) -> GraphResult<()> {
        if self.faulted(self.slot(id)?) {
            return Err(GraphError::ResultsUnavailable(id));
        }
        Ok(())
    }

    fn check_has_field(name: &str, points: &dyn PointsNode, field: Field) -> GraphResult<()> {
        if points.has_field(field) {
            Ok(())
        } else {
            Err(GraphError::FieldMissing {
                node: name.to_string(),
                field,
            })
        }
    }

    /// Point count and bytes per point of `field` for an executed node.
    pub fn get_result_size(&self, id: NodeId, field: Field) -> GraphResult<(usize, usize)> {
        let name = self.slot(id)?.name.clone();
        let size = self.executed_points(id, |points| {
            Self::check_has_field(&name, points, field)?;
            Ok((points.point_count()?, points.field_point_size(field)))
        })?;
        self.ensure_intact(id)?;
        Ok(size)
    }

    /// Raw bytes of `field`; synchronises through the buffer being read.
    pub fn get_result_data(&self, id: NodeId, field: Field) -> GraphResult<Vec<u8>> {
        let name = self.slot(id)?.name.clone();
        let buffer = self.executed_points(id, |points| {
            Self::check_has_field(&name, points, field)?;
            points.field_data(field)
        })?;
        let data = buffer.get_data()?;
        self.ensure_intact(id)?;
        Ok(data)
    }

    pub fn get_result_typed<T: FieldTag>(&self, id: NodeId) -> GraphResult<Vec<T::Elem>> {
        let name = self.slot(id)?.name.clone();
        let buffer = self.executed_points(id, |points| {
            Self::check_has_field(&name, points, T::FIELD)?;
            points.field_data_typed::<T>()
        })?;
        let values = buffer.to_vec()?;
        self.ensure_intact(id)?;
        Ok(values)
    }

    // ── Recording ──

    /// Start recording graph calls, discarding any unfinished recording.
    pub fn start_recording(&mut self) {
        self.recorder = Some(Vec::new());
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn stop_recording(&mut self) -> Option<Tape> {
        self.recorder.take().map(Tape::new)
    }

    fn record(&mut self, call: TapeCall) {
        if let Some(calls) = self.recorder.as_mut() {
            tracing::trace!("Recorded {:?}", call);
            calls.push(call);
        }
    }

    // ── Arena access ──

    fn slot(&self, id: NodeId) -> GraphResult<&NodeSlot> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> GraphResult<&mut NodeSlot> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn slot_name(&self, id: NodeId) -> String {
        self.slot(id).map(|s| s.name.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("generation", &self.generation)
            .field("stream", &self.ctx.stream)
            .finish_non_exhaustive()
    }
}
