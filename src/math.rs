//! Minimal math primitives shared by nodes and kernels.
//!
//! Only what the pipeline needs at its boundaries: 3-component vectors and
//! row-major 3x4 affine matrices. All types are `#[repr(C)]` + `Pod` so they
//! can be stored directly in device buffers.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Two-component float vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vec2f(pub [f32; 2]);

impl Vec2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self([x, y])
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.0[0]
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.0[1]
    }
}

/// Three-component float vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vec3f(pub [f32; 3]);

impl Vec3f {
    pub const ZERO: Vec3f = Vec3f([0.0, 0.0, 0.0]);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self([x, y, z])
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.0[0]
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.0[1]
    }

    #[inline]
    pub fn z(self) -> f32 {
        self.0[2]
    }

    #[inline]
    pub fn dot(self, other: Vec3f) -> f32 {
        self.x() * other.x() + self.y() * other.y() + self.z() * other.z()
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction; zero stays zero.
    pub fn normalized(self) -> Vec3f {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            self
        }
    }
}

impl Add for Vec3f {
    type Output = Vec3f;

    fn add(self, rhs: Vec3f) -> Vec3f {
        Vec3f::new(self.x() + rhs.x(), self.y() + rhs.y(), self.z() + rhs.z())
    }
}

impl Sub for Vec3f {
    type Output = Vec3f;

    fn sub(self, rhs: Vec3f) -> Vec3f {
        Vec3f::new(self.x() - rhs.x(), self.y() - rhs.y(), self.z() - rhs.z())
    }
}

impl Mul<f32> for Vec3f {
    type Output = Vec3f;

    fn mul(self, rhs: f32) -> Vec3f {
        Vec3f::new(self.x() * rhs, self.y() * rhs, self.z() * rhs)
    }
}

/// Row-major 3x4 affine transform: rotation/scale in columns 0..3,
/// translation in column 3.
///
/// Rays are described by such a matrix: the origin is the translation and
/// the direction is the transformed +Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Mat3x4f(pub [[f32; 4]; 3]);

impl Default for Mat3x4f {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat3x4f {
    pub const fn identity() -> Self {
        Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ])
    }

    pub const fn translation(x: f32, y: f32, z: f32) -> Self {
        Self([
            [1.0, 0.0, 0.0, x],
            [0.0, 1.0, 0.0, y],
            [0.0, 0.0, 1.0, z],
        ])
    }

    /// Rotation about the Y axis (yaw in a Z-forward frame), in radians.
    pub fn rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self([
            [c, 0.0, s, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [-s, 0.0, c, 0.0],
        ])
    }

    /// Rotation about the X axis, in radians.
    pub fn rotation_x(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, c, -s, 0.0],
            [0.0, s, c, 0.0],
        ])
    }

    #[inline]
    pub fn translation_part(&self) -> Vec3f {
        Vec3f::new(self.0[0][3], self.0[1][3], self.0[2][3])
    }

    /// Applies the full affine transform to a point.
    pub fn transform_point(&self, p: Vec3f) -> Vec3f {
        self.transform_vector(p) + self.translation_part()
    }

    /// Applies only the linear part to a direction.
    pub fn transform_vector(&self, v: Vec3f) -> Vec3f {
        let m = &self.0;
        Vec3f::new(
            m[0][0] * v.x() + m[0][1] * v.y() + m[0][2] * v.z(),
            m[1][0] * v.x() + m[1][1] * v.y() + m[1][2] * v.z(),
            m[2][0] * v.x() + m[2][1] * v.y() + m[2][2] * v.z(),
        )
    }

    /// Origin of a ray described by this matrix.
    #[inline]
    pub fn ray_origin(&self) -> Vec3f {
        self.translation_part()
    }

    /// Unit direction of a ray described by this matrix (local +Z).
    #[inline]
    pub fn ray_direction(&self) -> Vec3f {
        self.transform_vector(Vec3f::new(0.0, 0.0, 1.0)).normalized()
    }

    /// Inverse of the affine transform. Singular matrices yield identity.
    pub fn inverse(&self) -> Mat3x4f {
        let m = &self.0;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        if det.abs() <= f32::EPSILON {
            return Mat3x4f::identity();
        }
        let inv_det = 1.0 / det;
        let mut r = [[0.0f32; 4]; 3];
        r[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        r[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        r[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        r[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        r[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        r[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        r[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        r[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        r[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        let linear = Mat3x4f([
            [r[0][0], r[0][1], r[0][2], 0.0],
            [r[1][0], r[1][1], r[1][2], 0.0],
            [r[2][0], r[2][1], r[2][2], 0.0],
        ]);
        let t = linear.transform_vector(self.translation_part()) * -1.0;
        r[0][3] = t.x();
        r[1][3] = t.y();
        r[2][3] = t.z();
        Mat3x4f(r)
    }
}

impl Mul for Mat3x4f {
    type Output = Mat3x4f;

    /// Composition: `(a * b)` applies `b` first, then `a`.
    fn mul(self, rhs: Mat3x4f) -> Mat3x4f {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [[0.0f32; 4]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let mut sum = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
                if j == 3 {
                    sum += a[i][3];
                }
                *cell = sum;
            }
        }
        Mat3x4f(out)
    }
}
