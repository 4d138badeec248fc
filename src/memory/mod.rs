//! Dual-location memory substrate.
//!
//! ```text
//!   host bytes  ◄── download (after stream sync) ──┐
//!        │                                          │
//!        └── upload (enqueued on stream) ──►  device bytes
//! ```
//!
//! - [`Device`]: simulated device heap with allocation accounting.
//! - [`Stream`]: in-order work queue running kernels on a worker thread.
//! - [`Buffer`]: untyped host/device storage with per-location validity.
//! - [`TypedBuffer`]: checked typed lens over a `Buffer`.

pub mod buffer;
pub mod device;
pub mod error;
pub mod stream;
pub mod typed;

pub use buffer::{Buffer, DeviceView, MemLoc, MemoryKind};
pub use device::{AlignedBytes, Device, DevicePtr};
pub use error::{MemResult, MemoryError};
pub use stream::{KernelScope, Stream, STREAM_QUEUE_CAPACITY};
pub use typed::{DeviceSlice, DeviceSliceMut, TypedBuffer};
