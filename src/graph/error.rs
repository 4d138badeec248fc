//! Graph-specific error types.

use crate::field::Field;
use crate::graph::id::NodeId;
use crate::memory::MemoryError;
use thiserror::Error;

/// Errors raised while building, validating or running a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Structural precondition failed during validation.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Bad parameters or node combination at configuration time.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Node {0:?} not found")]
    NodeNotFound(NodeId),

    #[error("Node {child:?} is not a child of {parent:?}")]
    NotConnected { parent: NodeId, child: NodeId },

    #[error("Node {child:?} is already a child of {parent:?}")]
    AlreadyConnected { parent: NodeId, child: NodeId },

    #[error("Connecting {parent:?} -> {child:?} would create a cycle")]
    CycleDetected { parent: NodeId, child: NodeId },

    #[error("Field {field} is not device accessible in {node}")]
    FieldNotDeviceAccessible { node: String, field: Field },

    #[error("Field {field} is not produced by {node}")]
    FieldMissing { node: String, field: Field },

    #[error("Results of node {0:?} are unavailable; run it successfully first")]
    ResultsUnavailable(NodeId),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
