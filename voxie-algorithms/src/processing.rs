//! Higher-level helpers that combine sorting, merging and correction.

use crate::cluster::{merge_sorted_runs, sort_by_timestamp, Cluster};
use crate::xrf::{ClusterXrfCorrector, CorrectionStatistics, XrfCorrectionSettings};
use rayon::prelude::*;
use std::ops::Range;

/// Appends a freshly clustered sub-stream to an already sorted cluster list.
///
/// The sub-stream is sorted by timestamp, XRF-corrected on its own when the
/// settings enable it, and then merged stably into `clusters`, which stays
/// sorted by timestamp.
pub fn merge_sub_stream(
    clusters: &mut Vec<Cluster>,
    sub_stream: Vec<Cluster>,
    settings: &XrfCorrectionSettings,
) -> CorrectionStatistics {
    let existing = clusters.len();
    clusters.extend(sub_stream);
    sort_by_timestamp(&mut clusters[existing..]);

    let stats = if settings.enabled {
        ClusterXrfCorrector::new(settings.clone()).perform_xrf_correction(clusters, existing)
    } else {
        CorrectionStatistics::default()
    };

    merge_sorted_runs(clusters, existing);
    stats
}

/// Splits a time-sorted list into ranges no merge can cross.
///
/// A new range starts wherever two neighbors are more than
/// `temporal_margin` apart. Since every neighbor scan stops at the first
/// out-of-window cluster, correcting each range on its own gives exactly
/// the same result as one pass over the whole list.
#[must_use]
pub fn independent_segments(clusters: &[Cluster], temporal_margin: u64) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    if clusters.is_empty() {
        return segments;
    }

    let mut start = 0;
    for i in 1..clusters.len() {
        if clusters[i].timestamp.abs_diff(clusters[i - 1].timestamp) > temporal_margin {
            segments.push(start..i);
            start = i;
        }
    }
    segments.push(start..clusters.len());
    segments
}

/// XRF-corrects a whole time-sorted list, processing independent segments
/// in parallel.
pub fn correct_parallel(
    clusters: &mut Vec<Cluster>,
    settings: &XrfCorrectionSettings,
) -> CorrectionStatistics {
    let segments = independent_segments(clusters, settings.temporal_margin);
    if segments.len() <= 1 {
        let max_index = clusters.len();
        return ClusterXrfCorrector::new(settings.clone()).perform_correction(
            clusters, 0, max_index,
        );
    }

    let corrector = ClusterXrfCorrector::new(settings.clone());
    let source: &[Cluster] = clusters.as_slice();
    let results: Vec<(Vec<Cluster>, CorrectionStatistics)> = segments
        .par_iter()
        .map(|range| {
            let mut segment = source[range.clone()].to_vec();
            let len = segment.len();
            let stats = corrector.perform_correction(&mut segment, 0, len);
            (segment, stats)
        })
        .collect();

    let mut total = CorrectionStatistics::default();
    let survivors = results.iter().map(|(segment, _)| segment.len()).sum();
    let mut corrected = Vec::with_capacity(survivors);
    for (segment, stats) in results {
        corrected.extend(segment);
        total += stats;
    }
    *clusters = corrected;

    log::debug!(
        "parallel xrf correction over {} segments: {} merges",
        segments.len(),
        total.merged
    );
    total
}
