//! Metrics collection and registry.

use super::StatsSink;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for capture sessions.
pub struct MetricsRegistry {
    registry: Registry,
    samples: HistogramVec,
    events: IntCounterVec,
}

impl MetricsRegistry {
    /// Creates a new registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        // 1ms .. ~16s
        let samples = HistogramVec::new(
            HistogramOpts::new(
                "camera_session_sample",
                "Samples reported by capture sessions, labelled by sample name",
            )
            .buckets(exponential_buckets(1.0, 2.0, 15)?),
            &["metric"],
        )?;
        let events = IntCounterVec::new(
            Opts::new(
                "camera_session_events_total",
                "Capture session lifecycle events",
            ),
            &["event"],
        )?;

        registry.register(Box::new(samples.clone()))?;
        registry.register(Box::new(events.clone()))?;

        Ok(Self {
            registry,
            samples,
            events,
        })
    }

    /// Counts one occurrence of a lifecycle event.
    pub fn record_event(&self, event: &str) {
        if let Ok(counter) = self.events.get_metric_with_label_values(&[event]) {
            counter.inc();
        }
    }

    /// Number of samples recorded under `name`.
    pub fn sample_count(&self, name: &str) -> u64 {
        self.samples
            .get_metric_with_label_values(&[name])
            .map(|h| h.get_sample_count())
            .unwrap_or(0)
    }

    /// Number of times `event` has been counted.
    pub fn event_count(&self, event: &str) -> u64 {
        self.events
            .get_metric_with_label_values(&[event])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl StatsSink for MetricsRegistry {
    fn record_sample(&self, name: &str, value: u64) {
        match self.samples.get_metric_with_label_values(&[name]) {
            Ok(histogram) => histogram.observe(value as f64),
            Err(e) => tracing::trace!(name, error = %e, "Dropped stats sample"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_samples_recorded_per_name() {
        let registry = MetricsRegistry::new().unwrap();

        registry.record_sample("start_time_ms", 40);
        registry.record_sample("start_time_ms", 60);
        registry.record_sample("stop_time_ms", 3);

        assert_eq!(registry.sample_count("start_time_ms"), 2);
        assert_eq!(registry.sample_count("stop_time_ms"), 1);

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_session_sample_count{metric=\"start_time_ms\"} 2"));
        assert!(output.contains("camera_session_sample_sum{metric=\"start_time_ms\"} 100"));
    }

    #[test]
    fn test_event_counter() {
        let registry = MetricsRegistry::new().unwrap();

        registry.record_event("frame");
        registry.record_event("frame");
        registry.record_event("closed");

        assert_eq!(registry.event_count("frame"), 2);
        let output = registry.encode().unwrap();
        assert!(output.contains("camera_session_events_total{event=\"closed\"} 1"));
    }
}
