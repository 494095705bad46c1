//! XRF (X-ray fluorescence) cluster correction.
//!
//! Fluorescence photons emitted by the sensor material produce secondary
//! clusters close to the primary interaction in both space and time. The
//! corrector folds each such cluster into its nearest neighbor and then
//! removes the emptied entries.
//!
//! Key characteristics:
//! - Single deterministic pass over `[min_index, max_index)`, no state kept
//! - Relies on the input being sorted by timestamp: each neighbor scan stops
//!   at the first cluster outside the temporal margin
//! - Already merged (zero energy) clusters inside the window are stepped
//!   over without ending the scan

use crate::cluster::Cluster;
use voxie_core::progress::{report_progress, NoProgress, ProgressSink};
use voxie_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Progress is reported once per this many processed clusters.
const PROGRESS_STRIDE: usize = 1 << 14;

/// Configuration for XRF correction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct XrfCorrectionSettings {
    /// Whether pipelines should run the correction at all.
    pub enabled: bool,
    /// Lower bound of the accepted energy band (inclusive).
    pub min_energy: f32,
    /// Upper bound of the accepted energy band (inclusive).
    pub max_energy: f32,
    /// Maximum planar distance between merge partners.
    pub distance_limit: f32,
    /// Maximum timestamp difference between merge partners, in clock ticks.
    pub temporal_margin: u64,
}

impl Default for XrfCorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_energy: 0.0,
            max_energy: 30.0,
            distance_limit: 1.0,
            temporal_margin: 100,
        }
    }
}

impl XrfCorrectionSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the correction.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the accepted energy band.
    #[must_use]
    pub fn with_energy_band(mut self, min_energy: f32, max_energy: f32) -> Self {
        self.min_energy = min_energy;
        self.max_energy = max_energy;
        self
    }

    /// Sets the spatial distance limit.
    #[must_use]
    pub fn with_distance_limit(mut self, distance_limit: f32) -> Self {
        self.distance_limit = distance_limit;
        self
    }

    /// Sets the temporal margin.
    #[must_use]
    pub fn with_temporal_margin(mut self, temporal_margin: u64) -> Self {
        self.temporal_margin = temporal_margin;
        self
    }

    /// Checks that the settings describe a usable correction.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for an inverted or NaN energy band or a
    /// negative or NaN distance limit.
    pub fn validate(&self) -> Result<()> {
        if self.min_energy.is_nan() || self.max_energy.is_nan() {
            return Err(Error::ConfigError("energy band must not be NaN".into()));
        }
        if self.min_energy > self.max_energy {
            return Err(Error::ConfigError(format!(
                "min_energy {} exceeds max_energy {}",
                self.min_energy, self.max_energy
            )));
        }
        if self.distance_limit.is_nan() || self.distance_limit < 0.0 {
            return Err(Error::ConfigError(format!(
                "distance_limit must be non-negative, got {}",
                self.distance_limit
            )));
        }
        Ok(())
    }

    /// Returns true if a cluster with this energy takes part in merging.
    #[must_use]
    #[inline]
    pub fn accepts_energy(&self, energy: f32) -> bool {
        energy >= self.min_energy && energy <= self.max_energy
    }
}

/// Counters collected during one correction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionStatistics {
    /// Clusters in the processed range.
    pub processed: usize,
    /// Merges performed.
    pub merged: usize,
    /// Zero-energy clusters removed by compaction.
    pub removed: usize,
}

impl std::ops::AddAssign for CorrectionStatistics {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.merged += other.merged;
        self.removed += other.removed;
    }
}

enum Candidate {
    OutsideWindow,
    AlreadyMerged,
    InWindow(f32),
}

#[inline]
fn classify(current: &Cluster, check: &Cluster, temporal_margin: u64) -> Candidate {
    if current.timestamp.abs_diff(check.timestamp) > temporal_margin {
        Candidate::OutsideWindow
    } else if check.is_merged() {
        Candidate::AlreadyMerged
    } else {
        Candidate::InWindow(current.distance_squared(check))
    }
}

/// Windowed nearest-neighbor merge over a time-sorted cluster list.
#[derive(Debug, Clone, Default)]
pub struct ClusterXrfCorrector {
    settings: XrfCorrectionSettings,
}

impl ClusterXrfCorrector {
    /// Creates a corrector for the given settings.
    #[must_use]
    pub fn new(settings: XrfCorrectionSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &XrfCorrectionSettings {
        &self.settings
    }

    /// Corrects every cluster from `min_index` to the end of the list.
    pub fn perform_xrf_correction(
        &self,
        clusters: &mut Vec<Cluster>,
        min_index: usize,
    ) -> CorrectionStatistics {
        let max_index = clusters.len();
        self.perform_correction(clusters, min_index, max_index)
    }

    /// Corrects the half-open range `[min_index, max_index)`.
    ///
    /// `max_index` is clamped to the list length. Clusters outside the range
    /// are neither read nor modified.
    pub fn perform_correction(
        &self,
        clusters: &mut Vec<Cluster>,
        min_index: usize,
        max_index: usize,
    ) -> CorrectionStatistics {
        self.perform_correction_with_progress(clusters, min_index, max_index, &NoProgress)
    }

    /// Like [`perform_correction`](Self::perform_correction), reporting
    /// progress to `progress` on a best-effort basis.
    #[allow(clippy::cast_precision_loss)]
    pub fn perform_correction_with_progress(
        &self,
        clusters: &mut Vec<Cluster>,
        min_index: usize,
        max_index: usize,
        progress: &dyn ProgressSink,
    ) -> CorrectionStatistics {
        let max_index = max_index.min(clusters.len());
        let mut stats = CorrectionStatistics::default();
        if min_index >= max_index {
            return stats;
        }
        stats.processed = max_index - min_index;

        let margin = self.settings.temporal_margin;
        let limit_sq = self.settings.distance_limit * self.settings.distance_limit;

        for i in min_index..max_index {
            if (i - min_index) % PROGRESS_STRIDE == 0 {
                report_progress(progress, (i - min_index) as f64 / stats.processed as f64);
            }

            // Clusters already folded into a partner have nothing left to move.
            let current = clusters[i];
            if current.is_merged() || !self.settings.accepts_energy(current.energy) {
                continue;
            }

            let mut best_index = None;
            let mut best_distance = limit_sq;

            for j in (min_index..i).rev() {
                match classify(&current, &clusters[j], margin) {
                    Candidate::OutsideWindow => break,
                    Candidate::AlreadyMerged => {}
                    Candidate::InWindow(distance) => {
                        if distance < best_distance {
                            best_index = Some(j);
                            best_distance = distance;
                        }
                    }
                }
            }

            for j in i + 1..max_index {
                match classify(&current, &clusters[j], margin) {
                    Candidate::OutsideWindow => break,
                    Candidate::AlreadyMerged => {}
                    Candidate::InWindow(distance) => {
                        if distance < best_distance {
                            best_index = Some(j);
                            best_distance = distance;
                        }
                    }
                }
            }

            if let Some(j) = best_index {
                merge_pair(clusters, i, j);
                stats.merged += 1;
            }
        }

        stats.removed = compact_range(clusters, min_index, max_index);
        report_progress(progress, 1.0);

        log::debug!(
            "xrf correction: {} clusters, {} merges, {} removed",
            stats.processed,
            stats.merged,
            stats.removed
        );
        stats
    }
}

/// Folds the less energetic cluster of the pair into the other one.
///
/// The current cluster only absorbs the candidate when it is strictly more
/// energetic; on a tie the candidate absorbs the current cluster.
fn merge_pair(clusters: &mut [Cluster], current: usize, candidate: usize) {
    let current_energy = clusters[current].energy;
    let candidate_energy = clusters[candidate].energy;
    if current_energy > candidate_energy {
        clusters[current].energy += candidate_energy;
        clusters[candidate].energy = 0.0;
    } else {
        clusters[candidate].energy += current_energy;
        clusters[current].energy = 0.0;
    }
}

/// Removes merged clusters from `[min_index, max_index)`, keeping order.
///
/// Returns the number of removed clusters.
fn compact_range(clusters: &mut Vec<Cluster>, min_index: usize, max_index: usize) -> usize {
    let mut write = min_index;
    for read in min_index..max_index {
        if !clusters[read].is_merged() {
            clusters[write] = clusters[read];
            write += 1;
        }
    }
    clusters.drain(write..max_index);
    max_index - write
}
