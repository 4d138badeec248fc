//! Strongly-typed lens over an untyped [`Buffer`].
//!
//! A [`TypedBuffer<T>`] can only be built over a buffer whose element kind is
//! `T::KIND`; a mismatch is reported as [`MemoryError::TypeMismatch`] instead
//! of reinterpreting memory.

use super::buffer::{Buffer, DeviceView, MemLoc};
use super::error::{MemResult, MemoryError};
use super::stream::{KernelScope, Stream};
use crate::field::FieldElement;
use std::marker::PhantomData;

fn cast_elems<T: FieldElement>(bytes: &[u8]) -> Result<&[T], bytemuck::PodCastError> {
    if bytes.is_empty() {
        return Ok(&[]);
    }
    bytemuck::try_cast_slice(bytes)
}

fn cast_elems_mut<T: FieldElement>(bytes: &mut [u8]) -> Result<&mut [T], bytemuck::PodCastError> {
    if bytes.is_empty() {
        return Ok(&mut []);
    }
    bytemuck::try_cast_slice_mut(bytes)
}

/// Typed handle to a shared buffer. Cloning yields another reference.
pub struct TypedBuffer<T: FieldElement> {
    inner: Buffer,
    _elem: PhantomData<fn() -> T>,
}

impl<T: FieldElement> Clone for TypedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _elem: PhantomData,
        }
    }
}

impl<T: FieldElement> TypedBuffer<T> {
    pub fn new(stream: &Stream) -> Self {
        Self {
            inner: Buffer::new(T::KIND, stream),
            _elem: PhantomData,
        }
    }

    pub fn host_only() -> Self {
        Self {
            inner: Buffer::host_only(T::KIND),
            _elem: PhantomData,
        }
    }

    /// Dual-location buffer holding a copy of `values`.
    pub fn from_slice(values: &[T], stream: &Stream) -> MemResult<Self> {
        let buffer = Self::new(stream);
        buffer.set_data(values)?;
        Ok(buffer)
    }

    /// View an existing buffer as `T`, checking the element kind.
    pub fn from_untyped(buffer: Buffer) -> MemResult<Self> {
        let stored = buffer.element_kind();
        if stored != T::KIND {
            return Err(MemoryError::TypeMismatch {
                stored,
                stored_size: stored.size(),
                requested: T::KIND,
                requested_size: T::KIND.size(),
            });
        }
        Ok(Self {
            inner: buffer,
            _elem: PhantomData,
        })
    }

    pub fn untyped(&self) -> &Buffer {
        &self.inner
    }

    pub fn into_untyped(self) -> Buffer {
        self.inner
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_valid(&self, loc: MemLoc) -> bool {
        self.inner.is_valid(loc)
    }

    /// Resize preserving content and zeroing new elements.
    pub fn resize(&self, count: usize) -> MemResult<()> {
        self.inner.resize(count, true, true)
    }

    pub fn resize_with(&self, count: usize, preserve_data: bool, zero_init: bool) -> MemResult<()> {
        self.inner.resize(count, preserve_data, zero_init)
    }

    pub fn host_read<R>(&self, f: impl FnOnce(&[T]) -> R) -> MemResult<R> {
        self.inner
            .host_read(|bytes| cast_elems::<T>(bytes).map(f))?
            .map_err(MemoryError::from)
    }

    pub fn host_write<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> MemResult<R> {
        self.inner
            .host_write(|bytes| cast_elems_mut::<T>(bytes).map(f))?
            .map_err(MemoryError::from)
    }

    pub fn to_vec(&self) -> MemResult<Vec<T>> {
        self.host_read(|values| values.to_vec())
    }

    pub fn set_data(&self, values: &[T]) -> MemResult<()> {
        self.inner.set_data(bytemuck::cast_slice(values))
    }

    pub fn insert_data(&self, values: &[T], at: usize) -> MemResult<()> {
        self.inner.insert_data(bytemuck::cast_slice(values), at)
    }

    pub fn get(&self, index: usize) -> MemResult<T> {
        self.host_read(|values| values.get(index).copied())?
            .ok_or(MemoryError::IndexOutOfBounds {
                index,
                count: self.count(),
            })
    }

    pub fn set(&self, index: usize, value: T) -> MemResult<()> {
        let count = self.count();
        let written = self.host_write(|values| match values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })?;
        if written {
            Ok(())
        } else {
            Err(MemoryError::IndexOutOfBounds { index, count })
        }
    }

    pub fn device_read(&self) -> MemResult<DeviceSlice<T>> {
        Ok(DeviceSlice {
            view: self.inner.device_read()?,
            _elem: PhantomData,
        })
    }

    pub fn device_write(&self) -> MemResult<DeviceSliceMut<T>> {
        Ok(DeviceSliceMut {
            view: self.inner.device_write()?,
            _elem: PhantomData,
        })
    }
}

impl<T: FieldElement> std::fmt::Debug for TypedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedBuffer").field(&self.inner).finish()
    }
}

/// Read-only device slice for kernels.
pub struct DeviceSlice<T: FieldElement> {
    view: DeviceView,
    _elem: PhantomData<fn() -> T>,
}

impl<T: FieldElement> DeviceSlice<T> {
    pub fn len(&self) -> usize {
        self.view.count()
    }

    pub fn is_empty(&self) -> bool {
        self.view.count() == 0
    }

    pub fn read<R>(&self, scope: &KernelScope, f: impl FnOnce(&[T]) -> R) -> MemResult<R> {
        self.view
            .read(scope, |bytes| cast_elems::<T>(bytes).map(f))
            .map_err(MemoryError::from)
    }
}

/// Writable device slice for kernels.
pub struct DeviceSliceMut<T: FieldElement> {
    view: DeviceView,
    _elem: PhantomData<fn() -> T>,
}

impl<T: FieldElement> DeviceSliceMut<T> {
    pub fn len(&self) -> usize {
        self.view.count()
    }

    pub fn is_empty(&self) -> bool {
        self.view.count() == 0
    }

    pub fn write<R>(&self, scope: &KernelScope, f: impl FnOnce(&mut [T]) -> R) -> MemResult<R> {
        self.view
            .write(scope, |bytes| cast_elems_mut::<T>(bytes).map(f))
            .map_err(MemoryError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ElementKind;
    use crate::math::Vec3f;
    use crate::memory::device::Device;
    use proptest::prelude::*;

    fn stream() -> Stream {
        Stream::new(Device::new(), "typed-test").unwrap()
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let stream = stream();
        let positions = Buffer::new(ElementKind::Vec3F32, &stream);
        let err = TypedBuffer::<f32>::from_untyped(positions).unwrap_err();
        assert_eq!(
            err,
            MemoryError::TypeMismatch {
                stored: ElementKind::Vec3F32,
                stored_size: 12,
                requested: ElementKind::F32,
                requested_size: 4,
            }
        );
    }

    #[test]
    fn test_same_size_different_kind_rejected() {
        let buffer = Buffer::host_only(ElementKind::I32);
        assert!(TypedBuffer::<f32>::from_untyped(buffer).is_err());
    }

    #[test]
    fn test_typed_view_shares_storage() {
        let stream = stream();
        let untyped = Buffer::new(ElementKind::Vec3F32, &stream);
        let typed = TypedBuffer::<Vec3f>::from_untyped(untyped.clone()).unwrap();
        typed.set_data(&[Vec3f::new(1.0, 2.0, 3.0)]).unwrap();
        assert_eq!(untyped.count(), 1);
        assert_eq!(untyped.byte_len(), 12);
        assert!(typed.untyped().ptr_eq(&untyped));
    }

    #[test]
    fn test_get_set_bounds() {
        let typed = TypedBuffer::<u32>::host_only();
        typed.set_data(&[1, 2, 3]).unwrap();
        typed.set(1, 20).unwrap();
        assert_eq!(typed.get(1).unwrap(), 20);
        assert_eq!(
            typed.get(3),
            Err(MemoryError::IndexOutOfBounds { index: 3, count: 3 })
        );
        assert!(typed.set(5, 0).is_err());
    }

    #[test]
    fn test_kernel_round_trip() {
        let stream = stream();
        let input = TypedBuffer::<f32>::from_slice(&[1.0, 2.0, 3.0], &stream).unwrap();
        let output = TypedBuffer::<f32>::new(&stream);
        output.resize_with(3, false, false).unwrap();

        let src = input.device_read().unwrap();
        let dst = output.device_write().unwrap();
        stream
            .launch("double", move |scope| {
                let values = src.read(scope, |s| s.to_vec())?;
                dst.write(scope, |d| {
                    for (o, v) in d.iter_mut().zip(values) {
                        *o = v * 2.0;
                    }
                })
            })
            .unwrap();

        assert_eq!(output.to_vec().unwrap(), vec![2.0, 4.0, 6.0]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        HostWrite(usize, i32),
        DeviceWrite(usize, i32),
        HostRead,
        DeviceRead,
        Resize(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..16, any::<i32>()).prop_map(|(i, v)| Op::HostWrite(i, v)),
            (0usize..16, any::<i32>()).prop_map(|(i, v)| Op::DeviceWrite(i, v)),
            Just(Op::HostRead),
            Just(Op::DeviceRead),
            (0usize..16).prop_map(Op::Resize),
        ]
    }

    fn device_snapshot(stream: &Stream, buffer: &TypedBuffer<i32>) -> Vec<i32> {
        let src = buffer.device_read().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        stream
            .launch("snapshot", move |scope| {
                let values = src.read(scope, |s| s.to_vec())?;
                let _ = tx.send(values);
                Ok(())
            })
            .unwrap();
        rx.recv().unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Whatever the interleaving of host and device accesses, both
        /// locations observe the most recent write.
        #[test]
        fn prop_lazy_copy_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let stream = stream();
            let buffer = TypedBuffer::<i32>::new(&stream);
            buffer.resize(4).unwrap();
            let mut model = vec![0i32; 4];

            for op in ops {
                match op {
                    Op::HostWrite(i, v) => {
                        if i < model.len() {
                            buffer.set(i, v).unwrap();
                            model[i] = v;
                        }
                    }
                    Op::DeviceWrite(i, v) => {
                        if i < model.len() {
                            let dst = buffer.device_write().unwrap();
                            stream.launch("poke", move |scope| {
                                dst.write(scope, |d| d[i] = v)
                            }).unwrap();
                            model[i] = v;
                        }
                    }
                    Op::HostRead => {
                        prop_assert_eq!(buffer.to_vec().unwrap(), model.clone());
                    }
                    Op::DeviceRead => {
                        prop_assert_eq!(device_snapshot(&stream, &buffer), model.clone());
                    }
                    Op::Resize(n) => {
                        buffer.resize(n).unwrap();
                        model.resize(n, 0);
                    }
                }
            }
            prop_assert_eq!(buffer.to_vec().unwrap(), model);
        }
    }
}
