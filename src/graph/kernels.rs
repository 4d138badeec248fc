//! Device kernels shared by the built-in nodes.
//!
//! Every function allocates a fresh output buffer, captures device views of
//! its inputs and enqueues one kernel on `stream`. Nothing here blocks; host
//! code observes results through the lazy-copy discipline of [`Buffer`].

use crate::field::ElementKind;
use crate::math::{Mat3x4f, Vec2f, Vec3f};
use crate::memory::{Buffer, DeviceView, MemResult, MemoryError, Stream, TypedBuffer};
use std::f32::consts::PI;

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f32 = 299_792_458.0;

/// Copy `src[indices[i]]` into element `i` of a new buffer.
///
/// An index past the end of `src` fails the kernel with `IndexOutOfBounds`,
/// reported at the next synchronization of `stream`.
pub fn gather(stream: &Stream, src: &Buffer, indices: &TypedBuffer<u32>) -> MemResult<Buffer> {
    let out = Buffer::new(src.element_kind(), stream);
    out.resize(indices.count(), false, false)?;

    let elem = src.element_size();
    let src_count = src.count();
    let src_view = src.device_read()?;
    let idx_view = indices.device_read()?;
    let dst_view = out.device_write()?;

    stream.launch("gather", move |scope| {
        let idx = idx_view.read(scope, |s| s.to_vec())?;
        src_view.read(scope, |from| {
            dst_view.write(scope, |to| {
                for (o, &i) in idx.iter().enumerate() {
                    let i = i as usize;
                    if i >= src_count {
                        return Err(MemoryError::IndexOutOfBounds {
                            index: i,
                            count: src_count,
                        });
                    }
                    to[o * elem..(o + 1) * elem].copy_from_slice(&from[i * elem..(i + 1) * elem]);
                }
                Ok(())
            })
        })
    })?;
    Ok(out)
}

pub fn transform_points(
    stream: &Stream,
    xyz: &TypedBuffer<Vec3f>,
    transform: Mat3x4f,
) -> MemResult<TypedBuffer<Vec3f>> {
    let out = TypedBuffer::<Vec3f>::new(stream);
    out.resize_with(xyz.count(), false, false)?;
    let src = xyz.device_read()?;
    let dst = out.device_write()?;

    stream.launch("transform_points", move |scope| {
        let points = src.read(scope, |s| s.to_vec())?;
        dst.write(scope, |d| {
            for (o, p) in d.iter_mut().zip(points) {
                *o = transform.transform_point(p);
            }
        })
    })?;
    Ok(out)
}

/// Left-multiply every ray pose by `transform`.
pub fn transform_rays(
    stream: &Stream,
    rays: &TypedBuffer<Mat3x4f>,
    transform: Mat3x4f,
) -> MemResult<TypedBuffer<Mat3x4f>> {
    let out = TypedBuffer::<Mat3x4f>::new(stream);
    out.resize_with(rays.count(), false, false)?;
    let src = rays.device_read()?;
    let dst = out.device_write()?;

    stream.launch("transform_rays", move |scope| {
        let poses = src.read(scope, |s| s.to_vec())?;
        dst.write(scope, |d| {
            for (o, pose) in d.iter_mut().zip(poses) {
                *o = transform * pose;
            }
        })
    })?;
    Ok(out)
}

/// Indices of hit points plus a one-element buffer with their number.
///
/// The index buffer is sized for the worst case; callers read the count on
/// the host and shrink it.
pub fn compact_indices(
    stream: &Stream,
    is_hit: &TypedBuffer<i32>,
) -> MemResult<(TypedBuffer<u32>, TypedBuffer<u32>)> {
    let indices = TypedBuffer::<u32>::new(stream);
    indices.resize_with(is_hit.count(), false, false)?;
    let count = TypedBuffer::<u32>::new(stream);
    count.resize_with(1, false, false)?;

    let hits = is_hit.device_read()?;
    let idx_out = indices.device_write()?;
    let count_out = count.device_write()?;

    stream.launch("compact_indices", move |scope| {
        let flags = hits.read(scope, |s| s.to_vec())?;
        let written = idx_out.write(scope, |out| {
            let mut n = 0usize;
            for (i, &flag) in flags.iter().enumerate() {
                if flag != 0 {
                    out[n] = i as u32;
                    n += 1;
                }
            }
            n
        })?;
        count_out.write(scope, |c| c[0] = written as u32)
    })?;
    Ok((indices, count))
}

/// Append the contents of `parts` into one new buffer of `kind`.
pub fn concat(stream: &Stream, kind: ElementKind, parts: &[Buffer]) -> MemResult<Buffer> {
    let total: usize = parts.iter().map(Buffer::count).sum();
    let out = Buffer::new(kind, stream);
    out.resize(total, false, false)?;

    let views = parts
        .iter()
        .map(|part| {
            part.check_same_kind(kind)?;
            part.device_read()
        })
        .collect::<MemResult<Vec<DeviceView>>>()?;
    let dst = out.device_write()?;

    stream.launch("concat", move |scope| {
        dst.write(scope, |to| {
            let mut offset = 0;
            for view in &views {
                let len = view.byte_len();
                view.read(scope, |from| to[offset..offset + len].copy_from_slice(from));
                offset += len;
            }
        });
        Ok(())
    })?;
    Ok(out)
}

/// One column of a packed point layout. `source == None` is padding.
pub struct PackColumn {
    pub source: Option<DeviceView>,
    pub size: usize,
}

/// Interleave `columns` into a byte stream of `count` points.
pub fn pack_fields(stream: &Stream, columns: Vec<PackColumn>, count: usize) -> MemResult<Buffer> {
    let point_size: usize = columns.iter().map(|c| c.size).sum();
    let out = Buffer::new(ElementKind::U8, stream);
    out.resize(count * point_size, false, true)?;
    let dst = out.device_write()?;

    stream.launch("pack_fields", move |scope| {
        dst.write(scope, |to| {
            let mut offset = 0;
            for column in &columns {
                let size = column.size;
                match &column.source {
                    Some(view) => view.read(scope, |from| {
                        for p in 0..count {
                            let at = p * point_size + offset;
                            to[at..at + size].copy_from_slice(&from[p * size..(p + 1) * size]);
                        }
                    }),
                    None => {
                        for p in 0..count {
                            let at = p * point_size + offset;
                            to[at..at + size].fill(0);
                        }
                    }
                }
                offset += size;
            }
        });
        Ok(())
    })?;
    Ok(out)
}

/// Sensor parameters of the radar energy kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyParams {
    pub azimuth_step: f32,
    pub elevation_step: f32,
    pub frequency: f32,
}

impl EnergyParams {
    pub fn wavelength(&self) -> f32 {
        SPEED_OF_LIGHT / self.frequency
    }
}

/// Complex return factor of each point.
///
/// Amplitude scales with the footprint each ray covers at its distance and
/// with the cosine of the incidence angle; phase follows the round-trip
/// path length along the ray.
pub fn radar_energy(
    stream: &Stream,
    params: EnergyParams,
    rays: &TypedBuffer<Mat3x4f>,
    distance: &TypedBuffer<f32>,
    normal: &TypedBuffer<Vec3f>,
    xyz: &TypedBuffer<Vec3f>,
) -> MemResult<TypedBuffer<Vec2f>> {
    let count = distance.count();
    let out = TypedBuffer::<Vec2f>::new(stream);
    out.resize_with(count, false, false)?;

    let rays = rays.device_read()?;
    let distance = distance.device_read()?;
    let normal = normal.device_read()?;
    let xyz = xyz.device_read()?;
    let dst = out.device_write()?;

    stream.launch("radar_energy", move |scope| {
        let rays = rays.read(scope, |s| s.to_vec())?;
        let distance = distance.read(scope, |s| s.to_vec())?;
        let normal = normal.read(scope, |s| s.to_vec())?;
        let xyz = xyz.read(scope, |s| s.to_vec())?;
        if rays.len() < count || normal.len() < count || xyz.len() < count {
            return Err(MemoryError::IndexOutOfBounds {
                index: count,
                count: rays.len().min(normal.len()).min(xyz.len()),
            });
        }

        let wavelength = params.wavelength();
        let wave_number = 2.0 * PI / wavelength;
        dst.write(scope, |out| {
            for i in 0..count {
                let dir = rays[i].ray_direction();
                let cos_incidence = normal[i].dot(dir).abs();
                let footprint =
                    (distance[i] * params.azimuth_step) * (distance[i] * params.elevation_step);
                let amplitude = footprint * cos_incidence / wavelength;
                let path = (xyz[i] - rays[i].ray_origin()).dot(dir);
                let phase = 2.0 * wave_number * path;
                out[i] = Vec2f::new(amplitude * phase.cos(), amplitude * phase.sin());
            }
        })
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Device;

    fn stream() -> Stream {
        Stream::new(Device::new(), "kernels-test").unwrap()
    }

    #[test]
    fn test_gather() {
        let stream = stream();
        let src = TypedBuffer::<f32>::from_slice(&[10.0, 11.0, 12.0, 13.0], &stream).unwrap();
        let idx = TypedBuffer::<u32>::from_slice(&[3, 0, 0], &stream).unwrap();
        let out = gather(&stream, src.untyped(), &idx).unwrap();
        let out = TypedBuffer::<f32>::from_untyped(out).unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![13.0, 10.0, 10.0]);
    }

    #[test]
    fn test_gather_out_of_range_is_sticky() {
        let stream = stream();
        let src = TypedBuffer::<f32>::from_slice(&[1.0], &stream).unwrap();
        let idx = TypedBuffer::<u32>::from_slice(&[5], &stream).unwrap();
        gather(&stream, src.untyped(), &idx).unwrap();
        assert!(matches!(
            stream.synchronize(),
            Err(MemoryError::KernelFailed { .. })
        ));
        assert!(stream.synchronize().is_ok());
    }

    #[test]
    fn test_compact_indices() {
        let stream = stream();
        let hits = TypedBuffer::<i32>::from_slice(&[0, 1, 1, 0, 1], &stream).unwrap();
        let (indices, count) = compact_indices(&stream, &hits).unwrap();
        let n = count.get(0).unwrap() as usize;
        assert_eq!(n, 3);
        indices.resize_with(n, true, false).unwrap();
        assert_eq!(indices.to_vec().unwrap(), vec![1, 2, 4]);
    }

    #[test]
    fn test_pack_fields_with_padding() {
        let stream = stream();
        let a = TypedBuffer::<u16>::from_slice(&[0x0102, 0x0304], &stream).unwrap();
        let b = TypedBuffer::<u8>::from_slice(&[7, 8], &stream).unwrap();
        let columns = vec![
            PackColumn {
                source: Some(a.untyped().device_read().unwrap()),
                size: 2,
            },
            PackColumn { source: None, size: 1 },
            PackColumn {
                source: Some(b.untyped().device_read().unwrap()),
                size: 1,
            },
        ];
        let out = pack_fields(&stream, columns, 2).unwrap();
        let bytes = out.get_data().unwrap();
        let first = 0x0102u16.to_ne_bytes();
        let second = 0x0304u16.to_ne_bytes();
        assert_eq!(
            bytes,
            vec![first[0], first[1], 0, 7, second[0], second[1], 0, 8]
        );
    }

    #[test]
    fn test_concat() {
        let stream = stream();
        let a = TypedBuffer::<u32>::from_slice(&[1, 2], &stream).unwrap();
        let b = TypedBuffer::<u32>::from_slice(&[3], &stream).unwrap();
        let out = concat(
            &stream,
            ElementKind::U32,
            &[a.untyped().clone(), b.untyped().clone()],
        )
        .unwrap();
        let out = TypedBuffer::<u32>::from_untyped(out).unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_transform_points() {
        let stream = stream();
        let xyz = TypedBuffer::from_slice(&[Vec3f::new(1.0, 2.0, 3.0)], &stream).unwrap();
        let out = transform_points(&stream, &xyz, Mat3x4f::translation(1.0, 0.0, -1.0))
            .unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![Vec3f::new(2.0, 2.0, 2.0)]);
    }

    #[test]
    fn test_radar_energy_amplitude() {
        let stream = stream();
        let params = EnergyParams {
            azimuth_step: 0.01,
            elevation_step: 0.01,
            frequency: 79e9,
        };
        let rays = TypedBuffer::from_slice(&[Mat3x4f::identity()], &stream).unwrap();
        let distance = TypedBuffer::from_slice(&[10.0f32], &stream).unwrap();
        let normal = TypedBuffer::from_slice(&[Vec3f::new(0.0, 0.0, -1.0)], &stream).unwrap();
        let xyz = TypedBuffer::from_slice(&[Vec3f::new(0.0, 0.0, 10.0)], &stream).unwrap();
        let factors = radar_energy(&stream, params, &rays, &distance, &normal, &xyz).unwrap();
        let f = factors.get(0).unwrap();

        let expected = (10.0 * 0.01) * (10.0 * 0.01) / params.wavelength();
        let amplitude = (f.x() * f.x() + f.y() * f.y()).sqrt();
        assert!((amplitude - expected).abs() < expected * 1e-3);
    }
}
