//! Error handling for sensorgraph
//!
//! Subsystems keep their own error enums ([`GraphError`], [`MemoryError`]);
//! this module wraps them together with I/O, configuration and tape errors
//! for the crate-level [`Result`] alias.

use crate::graph::GraphError;
use crate::memory::MemoryError;
use thiserror::Error;

/// Main error type for sensorgraph operations
#[derive(Error, Debug)]
pub enum SensorGraphError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tape recording or replay errors
    #[error("Tape error: {0}")]
    Tape(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SensorGraphError>,
    },
}

impl SensorGraphError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SensorGraphError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The graph error underneath any context layers, if there is one.
    pub fn as_graph_error(&self) -> Option<&GraphError> {
        match self {
            SensorGraphError::Graph(e) => Some(e),
            SensorGraphError::WithContext { source, .. } => source.as_graph_error(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SensorGraphError {
    fn from(err: serde_json::Error) -> Self {
        SensorGraphError::Serialization(err.to_string())
    }
}

/// Result type alias for sensorgraph operations
pub type Result<T> = std::result::Result<T, SensorGraphError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<SensorGraphError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn test_error_display() {
        let err = SensorGraphError::Tape("unknown node 3".to_string());
        assert_eq!(err.to_string(), "Tape error: unknown node 3");
    }

    #[test]
    fn test_error_with_context() {
        let err = SensorGraphError::Config("bad value".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_graph_error_context() {
        let result: std::result::Result<(), GraphError> =
            Err(GraphError::NodeNotFound(NodeId(7)));
        let err = result.context("Replaying call 2").unwrap_err();
        assert!(err.to_string().starts_with("Replaying call 2"));
        assert_eq!(err.as_graph_error(), Some(&GraphError::NodeNotFound(NodeId(7))));
    }
}
