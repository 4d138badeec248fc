//! RaytraceNode: turns rays into points using the bound scene.
//!
//! One kernel calls the backend and then writes every produced field. The
//! output keeps one point per ray (not dense): misses have `IS_HIT == 0`,
//! infinite distance, zero normal and intensity, and lie at the end of the
//! range along the ray.

use crate::field::Field;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node::{ExecContext, Node, PointsNode, RaysInput, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::graph::scene::RayHit;
use crate::math::{Mat3x4f, Vec3f};
use crate::memory::{Buffer, DeviceSliceMut, TypedBuffer};
use std::collections::BTreeMap;

/// Fields every trace produces.
const TRACED_FIELDS: [Field; 11] = [
    Field::Xyz,
    Field::IsHit,
    Field::RayIdx,
    Field::EntityId,
    Field::Intensity,
    Field::Azimuth,
    Field::Elevation,
    Field::Distance,
    Field::RayPose,
    Field::Normal,
    Field::RadialSpeed,
];

pub struct RaytraceNode {
    range: f32,
    sensor_velocity: Vec3f,
    input: RaysInput,
    outputs: BTreeMap<Field, Buffer>,
    width: usize,
}

impl RaytraceNode {
    pub fn new(range: f32, sensor_velocity: Vec3f) -> GraphResult<Self> {
        Self::check(range)?;
        Ok(Self {
            range,
            sensor_velocity,
            input: RaysInput::new("Raytrace"),
            outputs: BTreeMap::new(),
            width: 0,
        })
    }

    fn check(range: f32) -> GraphResult<()> {
        if !(range.is_finite() && range > 0.0) {
            return Err(GraphError::InvalidArgument(format!(
                "raytrace range must be positive, got {}",
                range
            )));
        }
        Ok(())
    }

    fn has_ring_ids(&self) -> bool {
        self.input.ring_ids_count().map(|n| n > 0).unwrap_or(false)
    }
}

/// Per-ray attributes computed from one hit.
struct TracedPoint {
    xyz: Vec3f,
    distance: f32,
    normal: Vec3f,
    entity_id: i32,
    intensity: f32,
    azimuth: f32,
    elevation: f32,
    radial_speed: f32,
}

fn shade(ray: &Mat3x4f, hit: &RayHit, range: f32, to_sensor: &Mat3x4f, velocity: Vec3f) -> TracedPoint {
    let origin = ray.ray_origin();
    let dir = ray.ray_direction();
    let local = to_sensor.transform_vector(dir).normalized();
    let azimuth = local.x().atan2(local.z());
    let elevation = local.y().clamp(-1.0, 1.0).asin();
    let radial_speed = -velocity.dot(dir);

    if hit.is_hit() && hit.distance <= range {
        TracedPoint {
            xyz: origin + dir * hit.distance,
            distance: hit.distance,
            normal: hit.normal,
            entity_id: hit.instance_id,
            intensity: hit.normal.dot(dir).abs(),
            azimuth,
            elevation,
            radial_speed,
        }
    } else {
        TracedPoint {
            xyz: origin + dir * range,
            distance: f32::INFINITY,
            normal: Vec3f::ZERO,
            entity_id: RayHit::MISS.instance_id,
            intensity: 0.0,
            azimuth,
            elevation,
            radial_speed,
        }
    }
}

fn output_slice<T: crate::field::FieldElement>(
    outputs: &BTreeMap<Field, Buffer>,
    field: Field,
) -> GraphResult<DeviceSliceMut<T>> {
    let buffer = outputs
        .get(&field)
        .cloned()
        .ok_or(GraphError::FieldMissing {
            node: "Raytrace".to_string(),
            field,
        })?;
    Ok(TypedBuffer::<T>::from_untyped(buffer)?.device_write()?)
}

impl Node for RaytraceNode {
    fn name(&self) -> &str {
        "Raytrace"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        if ctx.exec.scene.is_none() {
            return Err(GraphError::InvalidPipeline(
                "Raytrace requires a bound scene".to_string(),
            ));
        }
        Ok(())
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        let scene = ctx.scene.clone().ok_or_else(|| {
            GraphError::InvalidPipeline("Raytrace requires a bound scene".to_string())
        })?;
        let rays = self.input.rays()?;
        let count = rays.count();
        let ring_ids = self.input.ring_ids()?;

        let mut fields: Vec<Field> = TRACED_FIELDS.to_vec();
        if ring_ids.is_some() {
            fields.push(Field::RingId);
        }

        // Fresh buffers every run; previous outputs may still be referenced
        let mut outputs = BTreeMap::new();
        for field in fields {
            let buffer = Buffer::new(field.element_kind(), &ctx.stream);
            buffer.resize(count, false, false)?;
            outputs.insert(field, buffer);
        }

        let rays_in = rays.device_read()?;
        let ring_in = ring_ids.as_ref().map(|r| r.device_read()).transpose()?;
        let xyz = output_slice::<Vec3f>(&outputs, Field::Xyz)?;
        let is_hit = output_slice::<i32>(&outputs, Field::IsHit)?;
        let ray_idx = output_slice::<u32>(&outputs, Field::RayIdx)?;
        let entity = output_slice::<i32>(&outputs, Field::EntityId)?;
        let intensity = output_slice::<f32>(&outputs, Field::Intensity)?;
        let azimuth = output_slice::<f32>(&outputs, Field::Azimuth)?;
        let elevation = output_slice::<f32>(&outputs, Field::Elevation)?;
        let distance = output_slice::<f32>(&outputs, Field::Distance)?;
        let pose = output_slice::<Mat3x4f>(&outputs, Field::RayPose)?;
        let normal = output_slice::<Vec3f>(&outputs, Field::Normal)?;
        let radial = output_slice::<f32>(&outputs, Field::RadialSpeed)?;
        let ring_out = match ring_in {
            Some(_) => Some(output_slice::<u16>(&outputs, Field::RingId)?),
            None => None,
        };

        let range = self.range;
        let velocity = self.sensor_velocity;
        let to_sensor = self.input.cumulative_ray_transform().inverse();

        ctx.stream.launch("raytrace", move |scope| {
            let poses = rays_in.read(scope, |s| s.to_vec())?;
            let mut hits = vec![RayHit::MISS; poses.len()];
            scene.backend.trace(scene.traversable, &poses, range, &mut hits);

            let points: Vec<TracedPoint> = poses
                .iter()
                .zip(&hits)
                .map(|(ray, hit)| shade(ray, hit, range, &to_sensor, velocity))
                .collect();

            xyz.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.xyz))?;
            is_hit.write(scope, |o| {
                o.iter_mut()
                    .zip(&points)
                    .for_each(|(o, p)| *o = p.distance.is_finite() as i32)
            })?;
            ray_idx.write(scope, |o| o.iter_mut().enumerate().for_each(|(i, o)| *o = i as u32))?;
            entity.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.entity_id))?;
            intensity.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.intensity))?;
            azimuth.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.azimuth))?;
            elevation.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.elevation))?;
            distance.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.distance))?;
            pose.write(scope, |o| o.copy_from_slice(&poses))?;
            normal.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.normal))?;
            radial.write(scope, |o| o.iter_mut().zip(&points).for_each(|(o, p)| *o = p.radial_speed))?;

            if let (Some(ring_in), Some(ring_out)) = (ring_in, ring_out) {
                let ids = ring_in.read(scope, |s| s.to_vec())?;
                if !ids.is_empty() {
                    ring_out.write(scope, |o| {
                        o.iter_mut().enumerate().for_each(|(i, o)| *o = ids[i % ids.len()])
                    })?;
                }
            }
            Ok(())
        })?;

        tracing::debug!("Raytrace enqueued for {} rays (range {})", count, range);
        self.outputs = outputs;
        self.width = count;
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::Raytrace {
                range,
                sensor_velocity,
            } => {
                Self::check(*range)?;
                self.range = *range;
                self.sensor_velocity = *sensor_velocity;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::Raytrace {
            range: self.range,
            sensor_velocity: self.sensor_velocity,
        })
    }
}

impl PointsNode for RaytraceNode {
    fn is_dense(&self) -> bool {
        false
    }

    fn has_field(&self, field: Field) -> bool {
        TRACED_FIELDS.contains(&field) || (field == Field::RingId && self.has_ring_ids())
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.width)
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.input.cumulative_ray_transform().inverse()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        self.outputs
            .get(&field)
            .cloned()
            .ok_or_else(|| GraphError::FieldMissing {
                node: self.name().to_string(),
                field,
            })
    }
}

impl std::fmt::Debug for RaytraceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaytraceNode")
            .field("range", &self.range)
            .field("sensor_velocity", &self.sensor_velocity)
            .field("width", &self.width)
            .finish()
    }
}
