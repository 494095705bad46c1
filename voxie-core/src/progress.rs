//! Progress reporting and cooperative cancellation.
//!
//! Long-running work (large container reads, cluster correction passes)
//! is driven by an outer operation layer. That layer is only visible here
//! through two small traits: [`ProgressSink`] receives completion fractions
//! and [`Operation`] additionally exposes a cancellation check that callers
//! poll at safe points. There is no preemptive cancellation.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver for progress updates in the range `0.0..=1.0`.
pub trait ProgressSink: Send + Sync {
    /// Publishes the completed fraction of the current work item.
    ///
    /// # Errors
    /// Returns an error if the report could not be delivered.
    fn set_progress(&self, fraction: f64) -> Result<()>;
}

/// An externally driven operation that can be cancelled cooperatively.
pub trait Operation: Send + Sync {
    /// Returns [`Error::Cancelled`] once cancellation has been requested.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the operation was cancelled.
    fn check_cancelled(&self) -> Result<()>;

    /// Publishes the completed fraction of the operation.
    ///
    /// # Errors
    /// Returns an error if the report could not be delivered.
    fn update_progress(&self, fraction: f64) -> Result<()>;
}

/// Sends a progress report without letting a failure escape.
///
/// The fraction is clamped to `0.0..=1.0`. Delivery failures are logged and
/// otherwise ignored, so the computation being reported on always continues.
pub fn report_progress(sink: &dyn ProgressSink, fraction: f64) {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    if let Err(err) = sink.set_progress(fraction) {
        log::warn!("ignoring failed progress report ({fraction:.3}): {err}");
    }
}

/// A sink and operation that discards progress and is never cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_progress(&self, _fraction: f64) -> Result<()> {
        Ok(())
    }
}

impl Operation for NoProgress {
    fn check_cancelled(&self) -> Result<()> {
        Ok(())
    }

    fn update_progress(&self, _fraction: f64) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    progress_bits: AtomicU64,
}

/// Shared cancellation flag with the most recent progress value.
///
/// Cloning yields another handle to the same state, so one clone can be
/// handed to the worker while another is kept by whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    state: Arc<HandleState>,
}

impl CancellationHandle {
    /// Creates a handle that is not cancelled and reports zero progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Returns the last reported progress fraction.
    #[must_use]
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.state.progress_bits.load(Ordering::Acquire))
    }
}

impl ProgressSink for CancellationHandle {
    fn set_progress(&self, fraction: f64) -> Result<()> {
        self.state
            .progress_bits
            .store(fraction.to_bits(), Ordering::Release);
        Ok(())
    }
}

impl Operation for CancellationHandle {
    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn update_progress(&self, fraction: f64) -> Result<()> {
        self.set_progress(fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl ProgressSink for FailingSink {
        fn set_progress(&self, _fraction: f64) -> Result<()> {
            Err(Error::ProgressReport("bus gone".to_string()))
        }
    }

    #[test]
    fn test_cancellation_handle_shared_state() {
        let handle = CancellationHandle::new();
        let worker = handle.clone();

        assert!(worker.check_cancelled().is_ok());
        handle.cancel();
        assert!(matches!(worker.check_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_report_progress_clamps() {
        let handle = CancellationHandle::new();
        report_progress(&handle, 1.5);
        assert!((handle.progress() - 1.0).abs() < f64::EPSILON);
        report_progress(&handle, -0.25);
        assert!(handle.progress().abs() < f64::EPSILON);
        report_progress(&handle, f64::NAN);
        assert!(handle.progress().abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_progress_swallows_failures() {
        // Must not panic or propagate.
        report_progress(&FailingSink, 0.5);
    }

    #[test]
    fn test_no_progress_never_cancels() {
        assert!(NoProgress.check_cancelled().is_ok());
        assert!(NoProgress.update_progress(0.3).is_ok());
    }
}
