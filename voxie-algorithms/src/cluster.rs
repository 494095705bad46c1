//! Cluster records and ordering helpers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detector timestamp in clock ticks.
pub type Timestamp = i64;

/// A clustered detector event.
///
/// An energy of exactly `0.0` marks a cluster that has been merged into
/// another one and is waiting to be removed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Time of the most energetic event in the cluster.
    pub timestamp: Timestamp,
    /// Mean X position in detector coordinates.
    pub x: f32,
    /// Mean Y position in detector coordinates.
    pub y: f32,
    /// Summed energy of all events in the cluster.
    pub energy: f32,
}

impl Cluster {
    /// Creates a new cluster.
    #[must_use]
    pub fn new(timestamp: Timestamp, x: f32, y: f32, energy: f32) -> Self {
        Self {
            timestamp,
            x,
            y,
            energy,
        }
    }

    /// Returns true if this cluster was absorbed by another one.
    #[must_use]
    #[inline]
    #[allow(clippy::float_cmp)]
    pub fn is_merged(&self) -> bool {
        self.energy == 0.0
    }

    /// Squared planar distance to another cluster.
    #[must_use]
    #[inline]
    pub fn distance_squared(&self, other: &Cluster) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Returns true if the clusters are in ascending timestamp order.
#[must_use]
pub fn is_time_sorted(clusters: &[Cluster]) -> bool {
    clusters
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp)
}

/// Sorts clusters by timestamp, keeping the relative order of equal timestamps.
pub fn sort_by_timestamp(clusters: &mut [Cluster]) {
    clusters.sort_by_key(|cluster| cluster.timestamp);
}

/// Stably merges the sorted runs `[..mid]` and `[mid..]` into one sorted run.
///
/// On equal timestamps, clusters from the first run come first.
pub fn merge_sorted_runs(clusters: &mut Vec<Cluster>, mid: usize) {
    let mid = mid.min(clusters.len());
    if mid == 0 || mid == clusters.len() {
        return;
    }
    if clusters[mid - 1].timestamp <= clusters[mid].timestamp {
        return;
    }

    let mut merged = Vec::with_capacity(clusters.len());
    let (left, right) = clusters.split_at(mid);
    let (mut l, mut r) = (0, 0);
    while l < left.len() && r < right.len() {
        if left[l].timestamp <= right[r].timestamp {
            merged.push(left[l]);
            l += 1;
        } else {
            merged.push(right[r]);
            r += 1;
        }
    }
    merged.extend_from_slice(&left[l..]);
    merged.extend_from_slice(&right[r..]);
    *clusters = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_squared() {
        let a = Cluster::new(0, 1.0, 1.0, 5.0);
        let b = Cluster::new(0, 4.0, 5.0, 5.0);
        assert_relative_eq!(a.distance_squared(&b), 25.0);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut clusters = vec![
            Cluster::new(5, 0.0, 0.0, 1.0),
            Cluster::new(1, 0.0, 0.0, 2.0),
            Cluster::new(5, 0.0, 0.0, 3.0),
        ];
        sort_by_timestamp(&mut clusters);
        let energies: Vec<f32> = clusters.iter().map(|c| c.energy).collect();
        assert_eq!(energies, vec![2.0, 1.0, 3.0]);
        assert!(is_time_sorted(&clusters));
    }

    #[test]
    fn test_merge_sorted_runs() {
        let mut clusters = vec![
            Cluster::new(1, 0.0, 0.0, 1.0),
            Cluster::new(4, 0.0, 0.0, 2.0),
            Cluster::new(9, 0.0, 0.0, 3.0),
            Cluster::new(2, 0.0, 0.0, 4.0),
            Cluster::new(4, 0.0, 0.0, 5.0),
        ];
        merge_sorted_runs(&mut clusters, 3);
        let order: Vec<(i64, f32)> = clusters.iter().map(|c| (c.timestamp, c.energy)).collect();
        assert_eq!(
            order,
            vec![(1, 1.0), (2, 4.0), (4, 2.0), (4, 5.0), (9, 3.0)]
        );
    }

    #[test]
    fn test_merge_sorted_runs_degenerate_split() {
        let mut clusters = vec![Cluster::new(3, 0.0, 0.0, 1.0)];
        merge_sorted_runs(&mut clusters, 0);
        merge_sorted_runs(&mut clusters, 7);
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_is_merged() {
        assert!(Cluster::new(0, 0.0, 0.0, 0.0).is_merged());
        assert!(!Cluster::new(0, 0.0, 0.0, 0.5).is_merged());
    }
}
