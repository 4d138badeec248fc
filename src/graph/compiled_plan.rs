use crate::graph::id::NodeId;

/// Execution plan for one run target.
/// Contains the nodes of the target's connected component that may run.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    /// Node the plan was compiled for
    pub target: NodeId,

    /// Scheduled node indices in topological order
    pub order: Vec<usize>,

    /// Component nodes left out because they or an ancestor are inactive
    pub skipped: Vec<usize>,

    /// Graph generation the plan was compiled against
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Live nodes in the whole graph
    pub total_nodes: usize,

    /// Nodes in the target's connected component
    pub component_nodes: usize,

    /// Nodes in the execution order
    pub scheduled_nodes: usize,

    /// Component nodes excluded by inactivity
    pub inactive_nodes: usize,

    /// Scheduled nodes without parents
    pub source_nodes: usize,

    /// Scheduled nodes without children
    pub sink_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    /// Create an empty plan for `target`
    pub fn empty(target: NodeId, generation: u64) -> Self {
        Self {
            target,
            order: Vec::new(),
            skipped: Vec::new(),
            generation,
            stats: PlanStats::default(),
        }
    }

    /// Check if the plan has any scheduled nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the target itself runs under this plan
    pub fn schedules_target(&self) -> bool {
        self.order.contains(&self.target.index())
    }

    /// Whether the plan is still valid for `target` at `generation`
    pub fn is_current(&self, target: NodeId, generation: u64) -> bool {
        self.target == target && self.generation == generation
    }
}
