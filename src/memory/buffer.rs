//! Dual-location (host/device) buffer with lazy synchronization.
//!
//! A [`Buffer`] holds `count` elements of a fixed [`ElementKind`] and may keep
//! a host copy, a device copy, or both. Each location carries a validity flag:
//!
//! - reading at a location first makes it valid, copying from the other
//!   location if that one is valid, or materializing zeros if neither is;
//! - writing at a location invalidates the other one.
//!
//! Locations are only allocated when first requested. Device-bound copies
//! are enqueued on the buffer's stream, host-bound copies synchronize that
//! stream first, so a host read after device work always observes it.

use super::device::{AlignedBytes, DevicePtr};
use super::error::{MemResult, MemoryError};
use super::stream::{KernelScope, Stream};
use crate::field::ElementKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Memory location of a buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemLoc {
    Host,
    Device,
}

/// Which locations a buffer may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Host and device copies, synchronized lazily.
    Dual,
    /// Host memory only; device access is an error.
    HostOnly,
}

struct BufferState {
    count: usize,
    capacity: usize,
    host: Option<AlignedBytes>,
    device: Option<DevicePtr>,
    host_valid: bool,
    device_valid: bool,
    stream: Option<Stream>,
}

/// Shared handle to dual-location storage. Cloning yields another reference.
#[derive(Clone)]
pub struct Buffer {
    kind: ElementKind,
    memory_kind: MemoryKind,
    state: Arc<Mutex<BufferState>>,
}

impl Buffer {
    /// Empty dual-location buffer whose device work runs on `stream`.
    pub fn new(kind: ElementKind, stream: &Stream) -> Self {
        Self::with_state(kind, MemoryKind::Dual, Some(stream.clone()))
    }

    /// Empty host-only buffer.
    pub fn host_only(kind: ElementKind) -> Self {
        Self::with_state(kind, MemoryKind::HostOnly, None)
    }

    /// Dual-location buffer initialized with `count` zeroed elements.
    pub fn zeroed(kind: ElementKind, count: usize, stream: &Stream) -> MemResult<Self> {
        let buffer = Self::new(kind, stream);
        buffer.resize(count, false, true)?;
        Ok(buffer)
    }

    fn with_state(kind: ElementKind, memory_kind: MemoryKind, stream: Option<Stream>) -> Self {
        Self {
            kind,
            memory_kind,
            state: Arc::new(Mutex::new(BufferState {
                count: 0,
                capacity: 0,
                host: None,
                device: None,
                host_valid: false,
                device_valid: false,
                stream,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn element_kind(&self) -> ElementKind {
        self.kind
    }

    pub fn element_size(&self) -> usize {
        self.kind.size()
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }

    pub fn is_device_accessible(&self) -> bool {
        self.memory_kind == MemoryKind::Dual
    }

    pub fn count(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Bytes covered by the logical count.
    pub fn byte_len(&self) -> usize {
        self.count() * self.element_size()
    }

    /// Whether `loc` currently holds the freshest data.
    pub fn is_valid(&self, loc: MemLoc) -> bool {
        let state = self.lock();
        match loc {
            MemLoc::Host => state.host_valid,
            MemLoc::Device => state.device_valid,
        }
    }

    pub fn stream(&self) -> Option<Stream> {
        self.lock().stream.clone()
    }

    /// True when both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    // ── Sizing ──

    /// Change the logical length.
    ///
    /// Below capacity this is O(1) and never moves data. Growing past
    /// capacity reallocates every valid location, copying the first
    /// `min(old, new)` elements when `preserve_data`; otherwise the content
    /// is discarded and reads observe zeros. With `zero_init`, elements
    /// exposed by growth are zeroed.
    pub fn resize(&self, new_count: usize, preserve_data: bool, zero_init: bool) -> MemResult<()> {
        let mut state = self.lock();
        let old_count = state.count;

        if new_count > state.capacity {
            self.reallocate(&mut state, new_count, preserve_data)?;
            // Fresh allocations are already zero past the preserved prefix
        } else if zero_init && new_count > old_count {
            self.zero_range(&mut state, old_count, new_count)?;
        }

        state.count = new_count;
        Ok(())
    }

    /// Ensure capacity for at least `capacity` elements without changing the count.
    pub fn reserve(&self, capacity: usize, preserve_data: bool) -> MemResult<()> {
        let mut state = self.lock();
        if capacity <= state.capacity {
            return Ok(());
        }
        self.reallocate(&mut state, capacity, preserve_data)
    }

    /// Drop all elements, keeping capacity.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.count = 0;
    }

    fn reallocate(&self, state: &mut BufferState, new_capacity: usize, preserve_data: bool) -> MemResult<()> {
        let elem = self.element_size();
        let keep_bytes = state.count.min(new_capacity) * elem;

        tracing::trace!(
            "Buffer reallocation {} -> {} elements of {} (preserve={})",
            state.capacity,
            new_capacity,
            self.kind,
            preserve_data
        );

        if !preserve_data {
            state.host = None;
            state.device = None;
            state.host_valid = false;
            state.device_valid = false;
            state.capacity = new_capacity;
            return Ok(());
        }

        let new_host = match (&state.host, state.host_valid) {
            (Some(old), true) => {
                let mut fresh = AlignedBytes::zeroed(new_capacity * elem);
                fresh.as_bytes_mut()[..keep_bytes].copy_from_slice(&old.as_bytes()[..keep_bytes]);
                Some(fresh)
            }
            _ => None,
        };

        let new_device = match (&state.device, state.device_valid) {
            (Some(old), true) => {
                let stream = Self::stream_of(state)?;
                let fresh = stream.device().allocate(new_capacity * elem)?;
                let src = old.clone();
                let dst = fresh.clone();
                stream.launch("buffer_grow_copy", move |scope| {
                    copy_device_prefix(scope, &src, &dst, keep_bytes);
                    Ok(())
                })?;
                Some(fresh)
            }
            _ => None,
        };

        state.host_valid = new_host.is_some();
        state.device_valid = new_device.is_some();
        state.host = new_host;
        state.device = new_device;
        state.capacity = new_capacity;
        Ok(())
    }

    fn zero_range(&self, state: &mut BufferState, from: usize, to: usize) -> MemResult<()> {
        let elem = self.element_size();
        let (start, end) = (from * elem, to * elem);

        if state.host_valid {
            if let Some(host) = state.host.as_mut() {
                host.as_bytes_mut()[start..end].fill(0);
            }
        }
        if state.device_valid {
            if let Some(device) = state.device.clone() {
                let stream = Self::stream_of(state)?;
                stream.launch("buffer_memset", move |scope| {
                    device.with_bytes_mut(scope, |b| b[start..end].fill(0));
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn stream_of(state: &BufferState) -> MemResult<Stream> {
        state
            .stream
            .clone()
            .ok_or_else(|| MemoryError::NotDeviceAccessible("host-only buffer has no stream".into()))
    }

    // ── Location management ──

    fn host_storage(state: &mut BufferState, bytes: usize) -> &mut AlignedBytes {
        if state.host.as_ref().map_or(true, |h| h.len() < bytes) {
            state.host = Some(AlignedBytes::zeroed(bytes));
        }
        state.host.get_or_insert_with(AlignedBytes::default)
    }

    fn ensure_host(&self, state: &mut BufferState) -> MemResult<()> {
        if state.host_valid {
            return Ok(());
        }
        let capacity_bytes = state.capacity * self.element_size();
        let used = state.count * self.element_size();

        if state.device_valid {
            let stream = Self::stream_of(state)?;
            stream.synchronize()?;
            let device = state.device.clone();
            let host = Self::host_storage(state, capacity_bytes);
            if let Some(device) = device {
                device.download(&mut host.as_bytes_mut()[..used]);
            }
            tracing::trace!("Buffer download of {} bytes", used);
        } else {
            let host = Self::host_storage(state, capacity_bytes);
            host.as_bytes_mut()[..used].fill(0);
        }
        state.host_valid = true;
        Ok(())
    }

    fn ensure_device(&self, state: &mut BufferState) -> MemResult<DevicePtr> {
        if self.memory_kind == MemoryKind::HostOnly {
            return Err(MemoryError::NotDeviceAccessible(format!(
                "host-only buffer of {}",
                self.kind
            )));
        }
        let stream = Self::stream_of(state)?;
        let capacity_bytes = state.capacity * self.element_size();
        let used = state.count * self.element_size();

        let reusable = state
            .device
            .as_ref()
            .filter(|d| d.size() >= capacity_bytes)
            .cloned();
        let device = match reusable {
            Some(d) => d,
            None => {
                let fresh = stream.device().allocate(capacity_bytes)?;
                state.device = Some(fresh.clone());
                // A new allocation cannot hold valid data
                state.device_valid = false;
                fresh
            }
        };

        if state.device_valid {
            return Ok(device);
        }

        if state.host_valid {
            let snapshot = state
                .host
                .as_ref()
                .map(|h| h.as_bytes()[..used].to_vec())
                .unwrap_or_default();
            let dst = device.clone();
            stream.launch("buffer_upload", move |scope| {
                dst.with_bytes_mut(scope, |b| b[..snapshot.len()].copy_from_slice(&snapshot));
                Ok(())
            })?;
            tracing::trace!("Buffer upload of {} bytes enqueued", used);
        } else {
            let dst = device.clone();
            stream.launch("buffer_memset", move |scope| {
                dst.with_bytes_mut(scope, |b| b[..used].fill(0));
                Ok(())
            })?;
        }
        state.device_valid = true;
        Ok(device)
    }

    // ── Host access ──

    /// Read the host copy, synchronizing from the device if needed.
    pub fn host_read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> MemResult<R> {
        let mut state = self.lock();
        self.ensure_host(&mut state)?;
        let used = state.count * self.element_size();
        let bytes = state.host.as_ref().map(|h| &h.as_bytes()[..used]).unwrap_or(&[]);
        Ok(f(bytes))
    }

    /// Write the host copy; the device copy becomes stale.
    pub fn host_write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> MemResult<R> {
        let mut state = self.lock();
        self.ensure_host(&mut state)?;
        state.device_valid = false;
        let used = state.count * self.element_size();
        let capacity_bytes = state.capacity * self.element_size();
        let host = Self::host_storage(&mut state, capacity_bytes);
        Ok(f(&mut host.as_bytes_mut()[..used]))
    }

    /// Replace the content with `bytes` (host side).
    pub fn set_data(&self, bytes: &[u8]) -> MemResult<()> {
        let count = self.count_for(bytes.len())?;
        let mut state = self.lock();
        if count > state.capacity {
            self.reallocate(&mut state, count, false)?;
        }
        state.count = count;
        let capacity_bytes = state.capacity * self.element_size();
        let host = Self::host_storage(&mut state, capacity_bytes);
        host.as_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        state.host_valid = true;
        state.device_valid = false;
        Ok(())
    }

    /// Copy of the content as host bytes.
    pub fn get_data(&self) -> MemResult<Vec<u8>> {
        self.host_read(|bytes| bytes.to_vec())
    }

    /// Insert whole elements at element index `at`, growing with preservation.
    pub fn insert_data(&self, bytes: &[u8], at: usize) -> MemResult<()> {
        let inserted = self.count_for(bytes.len())?;
        let old_count = self.count();
        if at > old_count {
            return Err(MemoryError::IndexOutOfBounds {
                index: at,
                count: old_count,
            });
        }
        self.resize(old_count + inserted, true, false)?;
        let elem = self.element_size();
        self.host_write(|dst| {
            let start = at * elem;
            let tail = (old_count - at) * elem;
            dst.copy_within(start..start + tail, start + bytes.len());
            dst[start..start + bytes.len()].copy_from_slice(bytes);
        })
    }

    /// Make this buffer a copy of `src`.
    ///
    /// Device-fresh sources are copied device-to-device in stream order;
    /// otherwise the host copy is used.
    pub fn copy_from(&self, src: &Buffer) -> MemResult<()> {
        if self.ptr_eq(src) {
            return Ok(());
        }
        self.check_same_kind(src.kind)?;

        let (count, src_device, src_stream) = {
            let s = src.lock();
            let device = if s.device_valid { s.device.clone() } else { None };
            (s.count, device, s.stream.clone())
        };

        match (src_device, self.memory_kind) {
            (Some(src_ptr), MemoryKind::Dual) => {
                let mut state = self.lock();
                let stream = Self::stream_of(&state)?;
                if let Some(src_stream) = src_stream {
                    if !src_stream.same_stream(&stream) {
                        src_stream.synchronize()?;
                    }
                }
                if count > state.capacity {
                    self.reallocate(&mut state, count, false)?;
                }
                state.count = count;
                let capacity_bytes = state.capacity * self.element_size();
                let reusable = state
                    .device
                    .as_ref()
                    .filter(|d| d.size() >= capacity_bytes)
                    .cloned();
                let dst = match reusable {
                    Some(d) => d,
                    None => {
                        let fresh = stream.device().allocate(capacity_bytes)?;
                        state.device = Some(fresh.clone());
                        fresh
                    }
                };
                let bytes = count * self.element_size();
                stream.launch("buffer_copy_d2d", move |scope| {
                    copy_device_prefix(scope, &src_ptr, &dst, bytes);
                    Ok(())
                })?;
                state.device_valid = true;
                state.host_valid = false;
                Ok(())
            }
            _ => {
                let bytes = src.get_data()?;
                self.set_data(&bytes)
            }
        }
    }

    // ── Device access ──

    /// Device view for reading; uploads host-fresh data in stream order.
    pub fn device_read(&self) -> MemResult<DeviceView> {
        let mut state = self.lock();
        let ptr = self.ensure_device(&mut state)?;
        Ok(DeviceView {
            ptr,
            count: state.count,
            kind: self.kind,
        })
    }

    /// Device view for writing; the host copy becomes stale.
    pub fn device_write(&self) -> MemResult<DeviceView> {
        let mut state = self.lock();
        let ptr = self.ensure_device(&mut state)?;
        state.host_valid = false;
        Ok(DeviceView {
            ptr,
            count: state.count,
            kind: self.kind,
        })
    }

    pub(crate) fn check_same_kind(&self, requested: ElementKind) -> MemResult<()> {
        if self.kind == requested {
            return Ok(());
        }
        Err(MemoryError::TypeMismatch {
            stored: self.kind,
            stored_size: self.kind.size(),
            requested,
            requested_size: requested.size(),
        })
    }

    fn count_for(&self, byte_len: usize) -> MemResult<usize> {
        let elem = self.element_size();
        if elem == 0 || byte_len % elem != 0 {
            return Err(MemoryError::InvalidByteLength {
                len: byte_len,
                element_size: elem,
            });
        }
        Ok(byte_len / elem)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Buffer")
            .field("kind", &self.kind)
            .field("count", &state.count)
            .field("capacity", &state.capacity)
            .field("host_valid", &state.host_valid)
            .field("device_valid", &state.device_valid)
            .finish()
    }
}

fn copy_device_prefix(scope: &KernelScope, src: &DevicePtr, dst: &DevicePtr, bytes: usize) {
    if src.ptr_eq(dst) {
        return;
    }
    src.with_bytes(scope, |s| {
        dst.with_bytes_mut(scope, |d| d[..bytes].copy_from_slice(&s[..bytes]));
    });
}

/// Device-side handle to a buffer's storage, captured by kernels.
///
/// The element count is fixed at the time the view was taken.
#[derive(Clone, Debug)]
pub struct DeviceView {
    ptr: DevicePtr,
    count: usize,
    kind: ElementKind,
}

impl DeviceView {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn element_kind(&self) -> ElementKind {
        self.kind
    }

    pub fn byte_len(&self) -> usize {
        self.count * self.kind.size()
    }

    pub fn ptr(&self) -> &DevicePtr {
        &self.ptr
    }

    pub fn read<R>(&self, scope: &KernelScope, f: impl FnOnce(&[u8]) -> R) -> R {
        let len = self.byte_len();
        self.ptr.with_bytes(scope, |b| f(&b[..len]))
    }

    pub fn write<R>(&self, scope: &KernelScope, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let len = self.byte_len();
        self.ptr.with_bytes_mut(scope, |b| f(&mut b[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::device::Device;

    fn stream() -> Stream {
        Stream::new(Device::new(), "buffer-test").unwrap()
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn read_ints(buffer: &Buffer) -> Vec<i32> {
        buffer
            .host_read(|b| bytemuck::cast_slice::<u8, i32>(b).to_vec())
            .unwrap()
    }

    #[test]
    fn test_host_write_device_read() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.set_data(&ints(&[1, 2, 3])).unwrap();
        assert!(buffer.is_valid(MemLoc::Host));
        assert!(!buffer.is_valid(MemLoc::Device));

        let view = buffer.device_read().unwrap();
        assert!(buffer.is_valid(MemLoc::Device));
        assert!(buffer.is_valid(MemLoc::Host));

        let (tx, rx) = crossbeam_channel::bounded(1);
        stream
            .launch("peek", move |scope| {
                let _ = tx.send(view.read(scope, |b| b.to_vec()));
                Ok(())
            })
            .unwrap();
        stream.synchronize().unwrap();
        assert_eq!(rx.recv().unwrap(), ints(&[1, 2, 3]));
    }

    #[test]
    fn test_device_write_host_read() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.resize(2, false, true).unwrap();
        let view = buffer.device_write().unwrap();
        assert!(!buffer.is_valid(MemLoc::Host));
        stream
            .launch("fill", move |scope| {
                view.write(scope, |b| b.copy_from_slice(&ints(&[9, 8])));
                Ok(())
            })
            .unwrap();
        // No explicit synchronize: the host read must do it
        assert_eq!(read_ints(&buffer), vec![9, 8]);
        assert!(buffer.is_valid(MemLoc::Host));
    }

    #[test]
    fn test_nothing_valid_reads_zeros() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.resize(4, false, false).unwrap();
        assert!(!buffer.is_valid(MemLoc::Host));
        assert!(!buffer.is_valid(MemLoc::Device));
        assert_eq!(read_ints(&buffer), vec![0; 4]);
    }

    #[test]
    fn test_smoke_sequence() {
        // device |4| -> host |4| -> grow to |4|3|0| -> device sees |4|3|0|
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.resize(1, false, true).unwrap();
        let view = buffer.device_write().unwrap();
        stream
            .launch("set", move |scope| {
                view.write(scope, |b| b.copy_from_slice(&ints(&[4])));
                Ok(())
            })
            .unwrap();
        assert_eq!(read_ints(&buffer), vec![4]);

        buffer.resize(3, true, true).unwrap();
        buffer
            .host_write(|b| b[4..8].copy_from_slice(&ints(&[3])))
            .unwrap();

        let view = buffer.device_read().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        stream
            .launch("peek", move |scope| {
                let _ = tx.send(view.read(scope, |b| b.to_vec()));
                Ok(())
            })
            .unwrap();
        stream.synchronize().unwrap();
        assert_eq!(rx.recv().unwrap(), ints(&[4, 3, 0]));
    }

    #[test]
    fn test_resize_shrink_then_grow_preserves_prefix() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.set_data(&ints(&[1, 2, 3, 4])).unwrap();
        buffer.resize(2, true, false).unwrap();
        assert_eq!(buffer.capacity(), 4);
        buffer.resize(4, true, true).unwrap();
        assert_eq!(read_ints(&buffer), vec![1, 2, 0, 0]);
        buffer.resize(6, true, true).unwrap();
        assert_eq!(read_ints(&buffer), vec![1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn test_grow_preserves_device_only_data() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.set_data(&ints(&[5, 6])).unwrap();
        let _ = buffer.device_write().unwrap();
        assert!(!buffer.is_valid(MemLoc::Host));
        buffer.resize(5, true, true).unwrap();
        assert_eq!(read_ints(&buffer), vec![5, 6, 0, 0, 0]);
    }

    #[test]
    fn test_grow_without_preserve_discards() {
        let stream = stream();
        let buffer = Buffer::new(ElementKind::I32, &stream);
        buffer.set_data(&ints(&[5, 6])).unwrap();
        buffer.resize(3, false, false).unwrap();
        assert_eq!(read_ints(&buffer), vec![0, 0, 0]);
    }

    #[test]
    fn test_insert_data() {
        let buffer = Buffer::host_only(ElementKind::I32);
        buffer.set_data(&ints(&[1, 4])).unwrap();
        buffer.insert_data(&ints(&[2, 3]), 1).unwrap();
        assert_eq!(read_ints(&buffer), vec![1, 2, 3, 4]);
        buffer.insert_data(&ints(&[5]), 4).unwrap();
        assert_eq!(read_ints(&buffer), vec![1, 2, 3, 4, 5]);
        assert!(matches!(
            buffer.insert_data(&ints(&[0]), 9),
            Err(MemoryError::IndexOutOfBounds { index: 9, count: 5 })
        ));
    }

    #[test]
    fn test_copy_from_device_fresh() {
        let stream = stream();
        let src = Buffer::new(ElementKind::I32, &stream);
        src.set_data(&ints(&[7, 7, 7])).unwrap();
        let _ = src.device_write().unwrap();
        let dst = Buffer::new(ElementKind::I32, &stream);
        dst.copy_from(&src).unwrap();
        assert!(dst.is_valid(MemLoc::Device));
        assert!(!dst.is_valid(MemLoc::Host));
        assert_eq!(read_ints(&dst), vec![7, 7, 7]);
    }

    #[test]
    fn test_copy_from_kind_mismatch() {
        let stream = stream();
        let src = Buffer::new(ElementKind::Vec3F32, &stream);
        let dst = Buffer::new(ElementKind::F32, &stream);
        assert!(matches!(
            dst.copy_from(&src),
            Err(MemoryError::TypeMismatch { stored_size: 4, requested_size: 12, .. })
        ));
    }

    #[test]
    fn test_invalid_byte_length() {
        let buffer = Buffer::host_only(ElementKind::I32);
        assert_eq!(
            buffer.set_data(&[1, 2, 3]),
            Err(MemoryError::InvalidByteLength { len: 3, element_size: 4 })
        );
    }

    #[test]
    fn test_host_only_not_device_accessible() {
        let buffer = Buffer::host_only(ElementKind::F32);
        assert!(!buffer.is_device_accessible());
        assert!(matches!(buffer.device_read(), Err(MemoryError::NotDeviceAccessible(_))));
    }

    #[test]
    fn test_out_of_device_memory() {
        let stream = Stream::new(Device::with_limit(Some(16)), "tiny").unwrap();
        let buffer = Buffer::new(ElementKind::Mat3x4F32, &stream);
        buffer.resize(1, false, true).unwrap();
        assert!(matches!(
            buffer.device_read(),
            Err(MemoryError::OutOfDeviceMemory { requested: 48, .. })
        ));
    }

    #[test]
    fn test_storage_freed_with_last_reference() {
        let stream = stream();
        let device = stream.device().clone();
        let buffer = Buffer::new(ElementKind::F32, &stream);
        buffer.resize(8, false, true).unwrap();
        let _ = buffer.device_read().unwrap();
        stream.synchronize().unwrap();
        assert_eq!(device.allocated_bytes(), 32);

        let alias = buffer.clone();
        drop(buffer);
        assert_eq!(device.allocated_bytes(), 32);
        drop(alias);
        assert_eq!(device.allocated_bytes(), 0);
    }
}
