//! Progress reporting.
//!
//! Hosts that show transfer progress implement [`ProgressSink`]. Every
//! place that reports takes an `Option`, so running without a sink is the
//! normal case.

use std::sync::Arc;

/// Receiver of human-readable progress.
pub trait ProgressSink: Send + Sync {
    fn info(&self, message: &str);

    /// `fraction` in `0.0..=1.0`.
    fn set_progress(&self, fraction: f64);
}

pub type SharedProgress = Option<Arc<dyn ProgressSink>>;

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn set_progress(&self, fraction: f64) {
        tracing::info!(fraction, "transfer progress");
    }
}

pub(crate) fn info(progress: &SharedProgress, message: &str) {
    if let Some(sink) = progress {
        sink.info(message);
    }
}

pub(crate) fn set_progress(progress: &SharedProgress, fraction: f64) {
    if let Some(sink) = progress {
        sink.set_progress(fraction.clamp(0.0, 1.0));
    }
}
