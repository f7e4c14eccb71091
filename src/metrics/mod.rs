//! Session statistics.
//!
//! Sessions report a few samples (startup latency, stop latency, chosen
//! resolution) to a [`StatsSink`]. Submission is fire-and-forget: sinks
//! swallow their own failures.
//!
//! [`MetricsRegistry`] is the Prometheus-backed sink. With the `metrics`
//! feature, [`MetricsServer`] exposes it over HTTP.
//!
//! # Metrics Exposed
//!
//! - `camera_session_sample{metric=...}` - histogram of submitted samples
//! - `camera_session_events_total{event=...}` - lifecycle event counters
//!
//! # Example
//!
//! ```no_run
//! use camera_session::metrics::{MetricsRegistry, StatsSink};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.record_sample("start_time_ms", 42);
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};

/// Sample name for time from open request to first frame.
pub const START_TIME_MS: &str = "start_time_ms";
/// Sample name for the duration of a stop.
pub const STOP_TIME_MS: &str = "stop_time_ms";
/// Sample name for the negotiated resolution (see
/// [`crate::format::resolution_sample`]).
pub const RESOLUTION: &str = "resolution";

/// Receives named numeric samples.
pub trait StatsSink: Send + Sync {
    /// Records one observation of sample `name`.
    fn record_sample(&self, name: &str, value: u64);
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record_sample(&self, _name: &str, _value: u64) {}
}
