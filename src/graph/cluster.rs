//! Host-side radar clustering.
//!
//! Points are grouped by (distance, azimuth, radial speed) using per-scope
//! separation thresholds chosen by distance:
//!
//! 1. Each point joins the **first** cluster whose running bounds lie within
//!    the thresholds of the point, otherwise it starts a new cluster. Points
//!    whose distance falls in no scope are dropped.
//! 2. While more than one cluster remains, the first mergeable pair (in
//!    creation order) is merged and the scan restarts from the beginning.
//! 3. Each cluster is represented by the member whose (azimuth, elevation)
//!    is closest in L1 to the centre of the cluster's bounding box.

use serde::{Deserialize, Serialize};

/// Distance band with its own separation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarScope {
    pub begin_distance: f32,
    pub end_distance: f32,
    pub distance_separation_threshold: f32,
    pub radial_speed_separation_threshold: f32,
    pub azimuth_separation_threshold: f32,
}

impl RadarScope {
    pub fn contains(&self, distance: f32) -> bool {
        self.begin_distance <= distance && distance <= self.end_distance
    }

    /// Reject inverted bands and negative or non-finite thresholds.
    pub fn check(&self) -> Result<(), String> {
        if !(self.begin_distance <= self.end_distance) {
            return Err(format!(
                "scope begin {} exceeds end {}",
                self.begin_distance, self.end_distance
            ));
        }
        let thresholds = [
            ("distance", self.distance_separation_threshold),
            ("radial speed", self.radial_speed_separation_threshold),
            ("azimuth", self.azimuth_separation_threshold),
        ];
        for (name, value) in thresholds {
            if !(value.is_finite() && value >= 0.0) {
                return Err(format!("{} separation threshold must be >= 0, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// First scope containing `distance`.
pub fn scope_for_distance(scopes: &[RadarScope], distance: f32) -> Option<&RadarScope> {
    scopes.iter().find(|scope| scope.contains(distance))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f32,
    pub max: f32,
}

impl MinMax {
    fn point(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn extend(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn union(&mut self, other: &MinMax) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn admits(&self, value: f32, threshold: f32) -> bool {
        value + threshold >= self.min && value - threshold <= self.max
    }

    fn overlaps(&self, other: &MinMax) -> bool {
        (other.min <= self.max && other.max >= self.min) || (self.min <= other.max && self.max >= other.min)
    }

    fn within_threshold(&self, other: &MinMax, threshold: f32) -> bool {
        (self.max - other.min).abs() <= threshold || (other.max - self.min).abs() <= threshold
    }

    fn mergeable(&self, other: &MinMax, threshold: f32) -> bool {
        self.overlaps(other) || self.within_threshold(other, threshold)
    }

    fn centre(&self) -> f32 {
        (self.min + self.max) / 2.0
    }
}

/// Scalar per-point inputs to clustering; all slices share one length.
#[derive(Debug, Clone, Copy)]
pub struct ClusterInput<'a> {
    pub distance: &'a [f32],
    pub azimuth: &'a [f32],
    pub radial_speed: &'a [f32],
    pub elevation: &'a [f32],
}

impl ClusterInput<'_> {
    pub fn len(&self) -> usize {
        self.distance
            .len()
            .min(self.azimuth.len())
            .min(self.radial_speed.len())
            .min(self.elevation.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadarCluster {
    pub indices: Vec<u32>,
    pub distance: MinMax,
    pub azimuth: MinMax,
    pub radial_speed: MinMax,
    pub elevation: MinMax,
}

impl RadarCluster {
    fn new(index: u32, distance: f32, azimuth: f32, radial_speed: f32, elevation: f32) -> Self {
        Self {
            indices: vec![index],
            distance: MinMax::point(distance),
            azimuth: MinMax::point(azimuth),
            radial_speed: MinMax::point(radial_speed),
            elevation: MinMax::point(elevation),
        }
    }

    fn add_point(&mut self, index: u32, distance: f32, azimuth: f32, radial_speed: f32, elevation: f32) {
        self.indices.push(index);
        self.distance.extend(distance);
        self.azimuth.extend(azimuth);
        self.radial_speed.extend(radial_speed);
        self.elevation.extend(elevation);
    }

    fn is_candidate(&self, distance: f32, azimuth: f32, radial_speed: f32, scope: &RadarScope) -> bool {
        self.distance.admits(distance, scope.distance_separation_threshold)
            && self.azimuth.admits(azimuth, scope.azimuth_separation_threshold)
            && self
                .radial_speed
                .admits(radial_speed, scope.radial_speed_separation_threshold)
    }

    fn can_merge_with(&self, other: &RadarCluster, scopes: &[RadarScope]) -> bool {
        // Compare the facing ends of the two distance ranges
        let min_to_compare = self.distance.min.max(other.distance.min);
        let max_to_compare = self.distance.max.min(other.distance.max);
        let Some(scope) = scope_for_distance(scopes, min_to_compare.max(max_to_compare)) else {
            return false;
        };

        self.distance
            .mergeable(&other.distance, scope.distance_separation_threshold)
            && self
                .azimuth
                .mergeable(&other.azimuth, scope.azimuth_separation_threshold)
            && self
                .radial_speed
                .mergeable(&other.radial_speed, scope.radial_speed_separation_threshold)
    }

    fn absorb(&mut self, other: RadarCluster) {
        self.distance.union(&other.distance);
        self.azimuth.union(&other.azimuth);
        self.radial_speed.union(&other.radial_speed);
        self.elevation.union(&other.elevation);
        self.indices.extend(other.indices);
    }

    /// Member closest (L1 over azimuth and elevation) to the bounding-box centre.
    /// Ties keep the earliest member.
    pub fn directional_center_index(&self, azimuth: &[f32], elevation: &[f32]) -> u32 {
        let mean_azimuth = self.azimuth.centre();
        let mean_elevation = self.elevation.centre();

        let mut best = self.indices.first().copied().unwrap_or(0);
        let mut best_distance = f32::MAX;
        for &i in &self.indices {
            let idx = i as usize;
            let d = (azimuth[idx] - mean_azimuth).abs() + (elevation[idx] - mean_elevation).abs();
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        best
    }
}

/// Group points into clusters.
pub fn cluster_points(input: &ClusterInput<'_>, scopes: &[RadarScope]) -> Vec<RadarCluster> {
    let mut clusters: Vec<RadarCluster> = Vec::new();

    for i in 0..input.len() {
        let distance = input.distance[i];
        let azimuth = input.azimuth[i];
        let radial_speed = input.radial_speed[i];
        let elevation = input.elevation[i];

        let Some(scope) = scope_for_distance(scopes, distance) else {
            continue;
        };

        let index = i as u32;
        match clusters
            .iter_mut()
            .find(|c| c.is_candidate(distance, azimuth, radial_speed, scope))
        {
            Some(cluster) => cluster.add_point(index, distance, azimuth, radial_speed, elevation),
            None => clusters.push(RadarCluster::new(index, distance, azimuth, radial_speed, elevation)),
        }
    }

    merge_clusters(&mut clusters, scopes);
    clusters
}

/// Merge until no pair qualifies, restarting after every merge.
fn merge_clusters(clusters: &mut Vec<RadarCluster>, scopes: &[RadarScope]) {
    'restart: while clusters.len() > 1 {
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                if clusters[i].can_merge_with(&clusters[j], scopes) {
                    let other = clusters.remove(j);
                    clusters[i].absorb(other);
                    continue 'restart;
                }
            }
        }
        break;
    }
}

/// One representative point index per cluster, in cluster order.
pub fn representative_indices(clusters: &[RadarCluster], azimuth: &[f32], elevation: &[f32]) -> Vec<u32> {
    clusters
        .iter()
        .map(|c| c.directional_center_index(azimuth, elevation))
        .collect()
}
