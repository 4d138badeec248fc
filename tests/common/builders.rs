//! Test data builders for rays, scopes and graphs

use sensorgraph::graph::RadarScope;
use sensorgraph::{Field, Mat3x4f, NodeSpec, Vec3f};

/// Builder for a horizontal fan of rays centred on +Z
pub struct RayFanBuilder {
    count: usize,
    step: f32,
    origin: Vec3f,
}

impl RayFanBuilder {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            step: 0.01,
            origin: Vec3f::ZERO,
        }
    }

    /// Azimuth step between neighbouring rays, in radians
    pub fn step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    pub fn origin(mut self, origin: Vec3f) -> Self {
        self.origin = origin;
        self
    }

    pub fn angles(&self) -> Vec<f32> {
        let centre = (self.count as f32 - 1.0) / 2.0;
        (0..self.count)
            .map(|i| (i as f32 - centre) * self.step)
            .collect()
    }

    pub fn build(self) -> Vec<Mat3x4f> {
        let place = Mat3x4f::translation(self.origin.x(), self.origin.y(), self.origin.z());
        self.angles()
            .into_iter()
            .map(|angle| place * Mat3x4f::rotation_y(angle))
            .collect()
    }

    pub fn spec(self) -> NodeSpec {
        NodeSpec::RaysFromMat3x4f { rays: self.build() }
    }
}

/// A single scope covering `0..=end` with the given thresholds
pub fn radar_scope(end: f32, distance: f32, azimuth: f32) -> RadarScope {
    RadarScope {
        begin_distance: 0.0,
        end_distance: end,
        distance_separation_threshold: distance,
        radial_speed_separation_threshold: 1.0,
        azimuth_separation_threshold: azimuth,
    }
}

pub fn radar_spec(scopes: Vec<RadarScope>) -> NodeSpec {
    NodeSpec::RadarPostprocess {
        scopes,
        azimuth_step: 0.01,
        elevation_step: 0.01,
        frequency: 79e9,
    }
}

pub fn raytrace_spec(range: f32) -> NodeSpec {
    NodeSpec::Raytrace {
        range,
        sensor_velocity: Vec3f::ZERO,
    }
}

pub fn yield_spec(fields: &[Field]) -> NodeSpec {
    NodeSpec::PointsYield {
        fields: fields.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_fan_builder() {
        let fan = RayFanBuilder::new(3).step(0.5);
        assert_eq!(fan.angles(), vec![-0.5, 0.0, 0.5]);
        let rays = fan.origin(Vec3f::new(0.0, 1.0, 0.0)).build();
        assert_eq!(rays.len(), 3);
        assert_eq!(rays[1].ray_origin(), Vec3f::new(0.0, 1.0, 0.0));
    }
}
