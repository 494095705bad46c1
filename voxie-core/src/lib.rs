//! voxie-core: Shared building blocks for the voxie processing core.
//!
//! This crate provides the error type shared by the I/O and algorithm
//! crates and the collaborator traits long-running work uses to report
//! progress and to observe cancellation.
//!

pub mod error;
pub mod progress;

pub use error::{Error, Result};
pub use progress::{report_progress, CancellationHandle, NoProgress, Operation, ProgressSink};
