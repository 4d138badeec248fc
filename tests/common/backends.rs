//! Analytic raytracing backends for integration tests

use sensorgraph::graph::{RayHit, RaytraceBackend, TraversableHandle};
use sensorgraph::{Mat3x4f, Vec2f, Vec3f};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Plane `z = depth` facing the sensor.
fn intersect_plane(ray: &Mat3x4f, depth: f32, range: f32, instance_id: i32) -> RayHit {
    let origin = ray.ray_origin();
    let dir = ray.ray_direction();
    if dir.z().abs() < 1e-6 {
        return RayHit::MISS;
    }
    let t = (depth - origin.z()) / dir.z();
    if t <= 0.0 || t > range {
        return RayHit::MISS;
    }
    RayHit {
        distance: t,
        normal: Vec3f::new(0.0, 0.0, -1.0),
        barycentric: Vec2f::new(0.0, 0.0),
        instance_id,
    }
}

/// A single wall at `z = depth`.
pub struct PlaneBackend {
    pub depth: f32,
    calls: AtomicUsize,
}

impl PlaneBackend {
    pub fn new(depth: f32) -> Self {
        Self {
            depth,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RaytraceBackend for PlaneBackend {
    fn trace(&self, _traversable: TraversableHandle, rays: &[Mat3x4f], range: f32, hits: &mut [RayHit]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (ray, hit) in rays.iter().zip(hits.iter_mut()) {
            *hit = intersect_plane(ray, self.depth, range, 1);
        }
    }
}

/// Two walls: rays heading left (`x < 0`) see `near`, the rest see `far`.
pub struct SplitPlaneBackend {
    pub near: f32,
    pub far: f32,
}

impl RaytraceBackend for SplitPlaneBackend {
    fn trace(&self, _traversable: TraversableHandle, rays: &[Mat3x4f], range: f32, hits: &mut [RayHit]) {
        for (ray, hit) in rays.iter().zip(hits.iter_mut()) {
            *hit = if ray.ray_direction().x() < 0.0 {
                intersect_plane(ray, self.near, range, 1)
            } else {
                intersect_plane(ray, self.far, range, 2)
            };
        }
    }
}
