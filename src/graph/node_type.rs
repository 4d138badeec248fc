//! Explicit descriptions of the built-in nodes.
//!
//! A [`NodeSpec`] carries every argument a built-in node is constructed from,
//! so creating or reconfiguring a node is a pure function of the spec. This
//! is what makes graph construction recordable and replayable.

use crate::field::Field;
use crate::graph::cluster::RadarScope;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node::NodeRef;
use crate::graph::nodes::{
    CompactPointsNode, FormatPointsNode, FromArrayPointsNode, FromMat3x4fRaysNode,
    RadarPostprocessPointsNode, RaytraceNode, SetRingIdsRaysNode, SpatialMergePointsNode,
    TransformPointsNode, TransformRaysNode, YieldPointsNode,
};
use crate::math::{Mat3x4f, Vec3f};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Built-in node plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeSpec {
    // Ray producers
    RaysFromMat3x4f {
        rays: Vec<Mat3x4f>,
    },
    RaysSetRingIds {
        ring_ids: Vec<u16>,
    },
    RaysTransform {
        transform: Mat3x4f,
    },

    /// Trace rays against the bound scene.
    Raytrace {
        range: f32,
        #[serde(default)]
        sensor_velocity: Vec3f,
    },

    // Point processing
    /// Points given as packed rows of `fields`.
    PointsFromArray {
        fields: Vec<Field>,
        data: Vec<u8>,
    },
    PointsCompact,
    PointsTransform {
        transform: Mat3x4f,
    },
    PointsYield {
        fields: Vec<Field>,
    },
    PointsFormat {
        fields: Vec<Field>,
    },
    PointsSpatialMerge {
        fields: Vec<Field>,
    },

    /// Cluster radar returns and keep one representative point per cluster.
    RadarPostprocess {
        scopes: Vec<RadarScope>,
        azimuth_step: f32,
        elevation_step: f32,
        frequency: f32,
    },
}

impl NodeSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::RaysFromMat3x4f { .. } => "RaysFromMat3x4f",
            NodeSpec::RaysSetRingIds { .. } => "RaysSetRingIds",
            NodeSpec::RaysTransform { .. } => "RaysTransform",
            NodeSpec::Raytrace { .. } => "Raytrace",
            NodeSpec::PointsFromArray { .. } => "PointsFromArray",
            NodeSpec::PointsCompact => "PointsCompact",
            NodeSpec::PointsTransform { .. } => "PointsTransform",
            NodeSpec::PointsYield { .. } => "PointsYield",
            NodeSpec::PointsFormat { .. } => "PointsFormat",
            NodeSpec::PointsSpatialMerge { .. } => "PointsSpatialMerge",
            NodeSpec::RadarPostprocess { .. } => "RadarPostprocess",
        }
    }
}

impl std::fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind_name())
    }
}

/// Builds built-in nodes from their specs.
pub struct NodeFactory;

impl NodeFactory {
    /// Construct the node described by `spec`, rejecting invalid arguments.
    pub fn create(spec: &NodeSpec) -> GraphResult<NodeRef> {
        let node: NodeRef = match spec.clone() {
            NodeSpec::RaysFromMat3x4f { rays } => share(FromMat3x4fRaysNode::new(rays)),
            NodeSpec::RaysSetRingIds { ring_ids } => share(SetRingIdsRaysNode::new(ring_ids)?),
            NodeSpec::RaysTransform { transform } => share(TransformRaysNode::new(transform)),
            NodeSpec::Raytrace {
                range,
                sensor_velocity,
            } => share(RaytraceNode::new(range, sensor_velocity)?),
            NodeSpec::PointsFromArray { fields, data } => {
                share(FromArrayPointsNode::new(fields, data)?)
            }
            NodeSpec::PointsCompact => share(CompactPointsNode::new()),
            NodeSpec::PointsTransform { transform } => share(TransformPointsNode::new(transform)),
            NodeSpec::PointsYield { fields } => share(YieldPointsNode::new(fields)?),
            NodeSpec::PointsFormat { fields } => share(FormatPointsNode::new(fields)?),
            NodeSpec::PointsSpatialMerge { fields } => share(SpatialMergePointsNode::new(fields)?),
            NodeSpec::RadarPostprocess {
                scopes,
                azimuth_step,
                elevation_step,
                frequency,
            } => share(RadarPostprocessPointsNode::new(
                scopes,
                azimuth_step,
                elevation_step,
                frequency,
            )?),
        };
        Ok(node)
    }
}

fn share<N: crate::graph::node::Node + 'static>(node: N) -> NodeRef {
    Arc::new(RwLock::new(node))
}

/// Reject field lists that cannot be produced as independent columns.
pub(crate) fn check_field_list(owner: &str, fields: &[Field], allow_padding: bool) -> GraphResult<()> {
    if fields.is_empty() {
        return Err(GraphError::InvalidArgument(format!(
            "{} requires at least one field",
            owner
        )));
    }
    for &field in fields {
        if field == Field::DynamicFormat || (!allow_padding && field.is_padding()) {
            return Err(GraphError::InvalidArgument(format!(
                "{} cannot take field {}",
                owner, field
            )));
        }
    }
    Ok(())
}

/// Reject lists naming a data field twice; each field maps to one column.
pub(crate) fn check_unique_fields(owner: &str, fields: &[Field]) -> GraphResult<()> {
    let mut seen = std::collections::BTreeSet::new();
    for &field in fields.iter().filter(|f| !f.is_padding()) {
        if !seen.insert(field) {
            return Err(GraphError::InvalidArgument(format!(
                "{} lists field {} more than once",
                owner, field
            )));
        }
    }
    Ok(())
}

/// Reconfiguration helper: the error for a spec of the wrong kind.
pub(crate) fn wrong_spec(owner: &str, spec: &NodeSpec) -> GraphError {
    GraphError::InvalidArgument(format!("{} cannot be reconfigured as {}", owner, spec))
}
