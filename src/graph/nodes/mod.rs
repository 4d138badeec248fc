//! Built-in node implementations.

pub mod compact_points;
pub mod filtered;
pub mod format_points;
pub mod from_array_points;
pub mod from_mat3x4f_rays;
pub mod radar_postprocess;
pub mod raytrace;
pub mod set_ring_ids_rays;
pub mod spatial_merge_points;
pub mod transform_points;
pub mod transform_rays;
pub mod yield_points;

pub use compact_points::CompactPointsNode;
pub use format_points::FormatPointsNode;
pub use from_array_points::FromArrayPointsNode;
pub use from_mat3x4f_rays::FromMat3x4fRaysNode;
pub use radar_postprocess::RadarPostprocessPointsNode;
pub use raytrace::RaytraceNode;
pub use set_ring_ids_rays::SetRingIdsRaysNode;
pub use spatial_merge_points::SpatialMergePointsNode;
pub use transform_points::TransformPointsNode;
pub use transform_rays::TransformRaysNode;
pub use yield_points::YieldPointsNode;
