//! Boundary to the raytracing backend.
//!
//! The graph never builds acceleration structures or intersects geometry
//! itself. A [`RaytraceBackend`] is bound together with an opaque
//! [`TraversableHandle`] and is called from inside a stream kernel, writing
//! per-ray hit attributes into buffers the raytrace node owns.

use crate::math::{Mat3x4f, Vec2f, Vec3f};
use std::sync::Arc;

/// Opaque handle to an acceleration structure owned by the scene subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraversableHandle(pub u64);

/// Intersection result for one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray; `f32::INFINITY` for misses.
    pub distance: f32,
    pub normal: Vec3f,
    pub barycentric: Vec2f,
    /// Entity instance hit, `-1` for misses.
    pub instance_id: i32,
}

impl RayHit {
    pub const MISS: RayHit = RayHit {
        distance: f32::INFINITY,
        normal: Vec3f::ZERO,
        barycentric: Vec2f::new(0.0, 0.0),
        instance_id: -1,
    };

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.distance.is_finite()
    }
}

impl Default for RayHit {
    fn default() -> Self {
        Self::MISS
    }
}

/// Ray/geometry intersection provider.
#[cfg_attr(test, mockall::automock)]
pub trait RaytraceBackend: Send + Sync {
    /// Trace `rays` (origin = translation, direction = local +Z) up to `range`,
    /// filling `hits` (same length as `rays`).
    fn trace(&self, traversable: TraversableHandle, rays: &[Mat3x4f], range: f32, hits: &mut [RayHit]);
}

/// Backend plus the traversable it should trace against.
#[derive(Clone)]
pub struct SceneBinding {
    pub backend: Arc<dyn RaytraceBackend>,
    pub traversable: TraversableHandle,
}

impl SceneBinding {
    pub fn new(backend: Arc<dyn RaytraceBackend>, traversable: TraversableHandle) -> Self {
        Self {
            backend,
            traversable,
        }
    }
}

impl std::fmt::Debug for SceneBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneBinding")
            .field("traversable", &self.traversable)
            .finish_non_exhaustive()
    }
}
