//! RadarPostprocessPointsNode: reduces radar returns to one point per cluster.
//!
//! Execute runs in three phases:
//!
//! 1. An energy kernel computes a complex return factor per point; the
//!    factors are copied back to the host, which synchronizes the stream.
//! 2. Distance, azimuth, radial speed and elevation are read on the host and
//!    clustered there (see [`cluster`](crate::graph::cluster)).
//! 3. The representative indices become the node's output; fields requested
//!    in earlier passes are gathered again before execute returns.

use crate::field::{tags, Field};
use crate::graph::cluster::{self, ClusterInput, RadarScope};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels::{self, EnergyParams};
use crate::graph::node::{check_fields, ExecContext, Node, PointsInput, PointsNode, ValidateContext};
use crate::graph::node_type::{wrong_spec, NodeSpec};
use crate::graph::nodes::filtered::FilteredFields;
use crate::math::Mat3x4f;
use crate::memory::{Buffer, TypedBuffer};

const REQUIRED_FIELDS: [Field; 7] = [
    Field::Distance,
    Field::Azimuth,
    Field::Elevation,
    Field::RadialSpeed,
    Field::RayPose,
    Field::Normal,
    Field::Xyz,
];

pub struct RadarPostprocessPointsNode {
    scopes: Vec<RadarScope>,
    params: EnergyParams,
    input: PointsInput,
    outputs: FilteredFields,
    cluster_count: usize,
    total_power: f32,
}

impl RadarPostprocessPointsNode {
    pub fn new(
        scopes: Vec<RadarScope>,
        azimuth_step: f32,
        elevation_step: f32,
        frequency: f32,
    ) -> GraphResult<Self> {
        let params = EnergyParams {
            azimuth_step,
            elevation_step,
            frequency,
        };
        Self::check(&scopes, &params)?;
        Ok(Self {
            scopes,
            params,
            input: PointsInput::new("RadarPostprocessPoints"),
            outputs: FilteredFields::new("RadarPostprocessPoints"),
            cluster_count: 0,
            total_power: 0.0,
        })
    }

    fn check(scopes: &[RadarScope], params: &EnergyParams) -> GraphResult<()> {
        for (i, scope) in scopes.iter().enumerate() {
            scope
                .check()
                .map_err(|e| GraphError::InvalidArgument(format!("radar scope {}: {}", i, e)))?;
        }
        if !(params.frequency.is_finite() && params.frequency > 0.0) {
            return Err(GraphError::InvalidArgument(format!(
                "radar frequency must be positive, got {}",
                params.frequency
            )));
        }
        if !(params.azimuth_step > 0.0 && params.elevation_step > 0.0) {
            return Err(GraphError::InvalidArgument(format!(
                "radar angular steps must be positive, got {} x {}",
                params.azimuth_step, params.elevation_step
            )));
        }
        Ok(())
    }

    /// Clusters found by the last execute.
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Sum of squared return factors of the last execute.
    pub fn total_power(&self) -> f32 {
        self.total_power
    }

    /// Whether `field` was gathered in the current pass.
    pub fn is_field_latest(&self, field: Field) -> bool {
        self.outputs.is_latest(field)
    }

    pub fn cached_fields(&self) -> Vec<Field> {
        self.outputs.cached_fields()
    }
}

impl Node for RadarPostprocessPointsNode {
    fn name(&self) -> &str {
        "RadarPostprocessPoints"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        self.input.bind(ctx)?;
        if !self.input.is_dense() {
            return Err(GraphError::InvalidPipeline(format!(
                "{} requires a compacted (dense) input",
                self.name()
            )));
        }
        self.input
            .with(|p| check_fields("RadarPostprocessPoints", p, &REQUIRED_FIELDS))?;
        self.outputs.reset();
        Ok(())
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        self.outputs.begin_pass(&ctx.stream);

        let distance = self.input.field_data_typed::<tags::Distance>()?;
        let rays = self.input.field_data_typed::<tags::RayPose>()?;
        let normal = self.input.field_data_typed::<tags::Normal>()?;
        let xyz = self.input.field_data_typed::<tags::Xyz>()?;

        let factors =
            kernels::radar_energy(&ctx.stream, self.params, &rays, &distance, &normal, &xyz)?;
        // Host copy of the factors; this is the stream synchronization point
        self.total_power = factors.host_read(|f| {
            f.iter()
                .map(|c| c.x() * c.x() + c.y() * c.y())
                .sum::<f32>()
        })?;

        if distance.count() == 0 {
            self.outputs.set_indices(TypedBuffer::from_slice(&[], &ctx.stream)?);
            self.cluster_count = 0;
            return self.outputs.materialize_all(&self.input);
        }

        let distance = distance.to_vec()?;
        let azimuth = self.input.field_data_typed::<tags::Azimuth>()?.to_vec()?;
        let radial_speed = self.input.field_data_typed::<tags::RadialSpeed>()?.to_vec()?;
        let elevation = self.input.field_data_typed::<tags::Elevation>()?.to_vec()?;

        let clusters = cluster::cluster_points(
            &ClusterInput {
                distance: &distance,
                azimuth: &azimuth,
                radial_speed: &radial_speed,
                elevation: &elevation,
            },
            &self.scopes,
        );
        let representatives = cluster::representative_indices(&clusters, &azimuth, &elevation);
        tracing::debug!(
            "RadarPostprocess: {} points -> {} clusters (power {:.3e})",
            distance.len(),
            clusters.len(),
            self.total_power
        );

        self.cluster_count = clusters.len();
        self.outputs
            .set_indices(TypedBuffer::from_slice(&representatives, &ctx.stream)?);
        self.outputs.materialize_all(&self.input)
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }

    fn reconfigure(&mut self, spec: &NodeSpec) -> GraphResult<()> {
        match spec {
            NodeSpec::RadarPostprocess {
                scopes,
                azimuth_step,
                elevation_step,
                frequency,
            } => {
                let params = EnergyParams {
                    azimuth_step: *azimuth_step,
                    elevation_step: *elevation_step,
                    frequency: *frequency,
                };
                Self::check(scopes, &params)?;
                self.scopes = scopes.clone();
                self.params = params;
                Ok(())
            }
            other => Err(wrong_spec(self.name(), other)),
        }
    }

    fn spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::RadarPostprocess {
            scopes: self.scopes.clone(),
            azimuth_step: self.params.azimuth_step,
            elevation_step: self.params.elevation_step,
            frequency: self.params.frequency,
        })
    }
}

impl PointsNode for RadarPostprocessPointsNode {
    fn required_fields(&self) -> Vec<Field> {
        REQUIRED_FIELDS.to_vec()
    }

    fn is_dense(&self) -> bool {
        true
    }

    fn has_field(&self, field: Field) -> bool {
        self.input.has_field(field)
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.outputs.width())
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        self.input.look_at_origin_transform()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        self.outputs.field_data(&self.input, field)
    }
}
