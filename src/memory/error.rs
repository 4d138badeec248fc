//! Memory-specific error types.

use crate::field::ElementKind;
use thiserror::Error;

/// Errors raised by buffers, device allocations and streams.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error(
        "Type mismatch: buffer holds {stored} ({stored_size} bytes) but {requested} ({requested_size} bytes) was requested"
    )]
    TypeMismatch {
        stored: ElementKind,
        stored_size: usize,
        requested: ElementKind,
        requested_size: usize,
    },

    #[error("Byte length {len} is not a whole number of {element_size}-byte elements")]
    InvalidByteLength { len: usize, element_size: usize },

    #[error("Out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory { requested: usize, available: usize },

    #[error("Not device accessible: {0}")]
    NotDeviceAccessible(String),

    #[error("Index {index} out of bounds for {count} elements")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Kernel '{kernel}' failed: {message}")]
    KernelFailed { kernel: String, message: String },

    #[error("Stream '{0}' is closed")]
    StreamClosed(String),

    #[error("Layout error: {0}")]
    Layout(String),
}

pub type MemResult<T> = std::result::Result<T, MemoryError>;

impl From<bytemuck::PodCastError> for MemoryError {
    fn from(err: bytemuck::PodCastError) -> Self {
        MemoryError::Layout(format!("{:?}", err))
    }
}
