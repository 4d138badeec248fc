//! Node graph: construction, validation, scheduling and execution.
//!
//! Rays flow from ray producers into the raytrace node, which emits point
//! fields; point nodes then filter, transform and pack those fields.
//!
//! # Architecture
//!
//! ```text
//! [RaysFromMat3x4f] ──► [RaysTransform] ──► [Raytrace] ──► [PointsCompact] ──► [RadarPostprocess]
//!                                                                        └──► [PointsFormat]
//! ```
//!
//! # Design
//!
//! - **Arena + adjacency**: [`Graph`] stores `NodeSlot`s addressed by [`NodeId`].
//! - **Lazy recompilation**: plans are rebuilt only when the generation changes.
//! - **Single stream**: every node of a run enqueues on the same in-order stream.
//! - **Field caches**: filtering nodes gather fields on demand and keep them per pass.

pub mod cache;
pub mod cluster;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod id;
pub mod kernels;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod scene;

pub use cache::{CacheLookup, FieldCache, FieldState};
pub use cluster::{RadarCluster, RadarScope};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use compiler::GraphCompiler;
pub use error::{GraphError, GraphResult};
pub use executor::{Graph, NodeHandle, RunReport};
pub use id::NodeId;
pub use node::{
    read_node, write_node, ExecContext, Node, NodeRef, NodeState, PointsInput, PointsInputs,
    PointsNode, RaysInput, RaysNode, ValidateContext,
};
pub use node_type::{NodeFactory, NodeSpec};
pub use scene::{RayHit, RaytraceBackend, SceneBinding, TraversableHandle};
