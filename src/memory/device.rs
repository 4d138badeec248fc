//! Simulated device heap.
//!
//! Device memory lives in host RAM but is only reachable through a
//! [`KernelScope`](super::stream::KernelScope), i.e. from work running on a
//! [`Stream`](super::stream::Stream). The heap tracks allocated bytes against
//! an optional limit so resource exhaustion is observable.

use super::error::{MemResult, MemoryError};
use super::stream::KernelScope;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Byte storage aligned to 8 bytes, enough for every [`ElementKind`](crate::field::ElementKind).
#[derive(Clone, Default)]
pub struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBytes {
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(8)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AlignedBytes({} bytes)", self.len)
    }
}

struct DeviceInner {
    limit: Option<usize>,
    allocated: AtomicUsize,
    peak: AtomicUsize,
}

/// Handle to the device heap. Cloning shares the same heap.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Device without an allocation limit.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                limit,
                allocated: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Bytes currently held by live allocations.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Acquire)
    }

    pub fn peak_bytes(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    /// Allocate `bytes` of zeroed device memory.
    pub fn allocate(&self, bytes: usize) -> MemResult<DevicePtr> {
        let limit = self.inner.limit;
        self.inner
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(bytes)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .map_err(|current| MemoryError::OutOfDeviceMemory {
                requested: bytes,
                available: limit.map_or(usize::MAX, |l| l.saturating_sub(current)),
            })?;
        let now = self.allocated_bytes();
        self.inner.peak.fetch_max(now, Ordering::AcqRel);

        tracing::trace!("Device allocation of {} bytes ({} in use)", bytes, now);

        Ok(DevicePtr(Arc::new(DeviceAllocation {
            storage: Mutex::new(AlignedBytes::zeroed(bytes)),
            bytes,
            heap: Arc::clone(&self.inner),
        })))
    }

    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("limit", &self.inner.limit)
            .field("allocated", &self.allocated_bytes())
            .finish()
    }
}

struct DeviceAllocation {
    storage: Mutex<AlignedBytes>,
    bytes: usize,
    heap: Arc<DeviceInner>,
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        self.heap.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Shared reference to a device allocation; freed when the last reference drops.
#[derive(Clone)]
pub struct DevicePtr(Arc<DeviceAllocation>);

impl DevicePtr {
    /// Allocation size in bytes.
    pub fn size(&self) -> usize {
        self.0.bytes
    }

    pub fn ptr_eq(&self, other: &DevicePtr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Kernel-side read access.
    pub fn with_bytes<R>(&self, _scope: &KernelScope, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.0.storage.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_bytes())
    }

    /// Kernel-side write access.
    pub fn with_bytes_mut<R>(&self, _scope: &KernelScope, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.0.storage.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_bytes_mut())
    }

    /// Host-side download. Callers must have synchronized the owning stream.
    pub(crate) fn download(&self, dst: &mut [u8]) {
        let guard = self.0.storage.lock().unwrap_or_else(PoisonError::into_inner);
        let n = dst.len().min(guard.len());
        dst[..n].copy_from_slice(&guard.as_bytes()[..n]);
    }
}

impl std::fmt::Debug for DevicePtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevicePtr({} bytes)", self.0.bytes)
    }
}
