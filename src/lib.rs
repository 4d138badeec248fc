//! # sensorgraph: node-graph sensor simulation
//!
//! A pipeline for emulating lidar and radar sensors. Rays are traced against
//! a scene through a pluggable backend, and the resulting per-point fields
//! flow through a DAG of processing nodes on a simulated device stream.
//!
//! ## Architecture
//!
//! - **Memory**: Dual-location buffers with lazy host/device synchronisation
//! - **Graph**: Nodes validated, scheduled and executed per connected component
//! - **Cache**: Per-field caches so filtering nodes gather each field once per pass
//! - **Tape**: Recording and replay of graph construction and runs
//!
//! ## Configuration
//!
//! The runtime config is stored under `dev.sensorgraph` in the platform
//! config directory; see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use sensorgraph::{field::tags, Field, Graph, NodeSpec};
//!
//! let mut graph = Graph::new()?;
//! let points = graph.create_node(NodeSpec::PointsFromArray {
//!     fields: vec![Field::Distance],
//!     data: 1.5f32.to_ne_bytes().to_vec(),
//! })?;
//! graph.run(points)?;
//! let distance = graph.get_result_typed::<tags::Distance>(points)?;
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod graph;
pub mod logging;
pub mod math;
pub mod memory;
pub mod tape;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Result, ResultExt, SensorGraphError};
pub use field::{ElementKind, Field, FieldElement, FieldTag};
pub use graph::{
    Graph, GraphError, GraphResult, NodeHandle, NodeId, NodeSpec, NodeState, RunReport,
    SceneBinding,
};
pub use math::{Mat3x4f, Vec2f, Vec3f};
pub use memory::{Buffer, MemoryError, Stream, TypedBuffer};
pub use tape::{Tape, TapeCall, TapePlayer};
