//! voxie-algorithms: Post-processing for clustered detector events.
//!
//! This crate provides:
//! - **Cluster** records produced by upstream event clustering
//! - **XRF correction** - windowed nearest-neighbor merge over a time-sorted
//!   cluster list, folding fluorescence side-clusters back into their origin
//! - **Sub-stream merging** and **parallel correction** helpers
//!
#![warn(missing_docs)]

mod cluster;
mod processing;
mod xrf;

pub use cluster::{is_time_sorted, merge_sorted_runs, sort_by_timestamp, Cluster, Timestamp};
pub use processing::{correct_parallel, independent_segments, merge_sub_stream};
pub use xrf::{ClusterXrfCorrector, CorrectionStatistics, XrfCorrectionSettings};
