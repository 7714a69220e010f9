//! Prometheus metrics for the event consumer

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops. If another
/// recorder is already installed, metrics stay unavailable and a warning
/// is logged.
pub fn init_metrics() {
    let result = PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
    });

    if let Err(e) = result {
        warn!(error = %e, "Failed to install Prometheus recorder");
    }
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format, or `None` before `init_metrics`
pub fn render_metrics() -> Option<String> {
    prometheus_handle().map(|h| h.render())
}

/// Per-topic consumer metrics helper
#[derive(Debug, Clone)]
pub struct ConsumerMetrics {
    topic: String,
}

impl ConsumerMetrics {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Record a message being pulled from the broker
    pub fn message_received(&self) {
        counter!(
            "consumer_messages_received_total",
            "topic" => self.topic.clone()
        )
        .increment(1);
    }

    /// Record the terminal outcome of one message
    pub fn message_processed(&self, event_type: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "consumer_messages_processed_total",
            "topic" => self.topic.clone(),
            "type" => event_type.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            "consumer_message_duration_seconds",
            "topic" => self.topic.clone(),
            "outcome" => outcome
        )
        .record(duration.as_secs_f64());
    }

    /// Record a broker receive error
    pub fn receive_error(&self) {
        counter!(
            "consumer_receive_errors_total",
            "topic" => self.topic.clone()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ConsumerMetrics::new("notifications");
        assert_eq!(metrics.topic(), "notifications");
    }

    #[test]
    fn test_recording_never_panics() {
        let metrics = ConsumerMetrics::new("notifications");
        metrics.message_received();
        metrics.message_processed("welcome", "handled", Duration::from_millis(5));
        metrics.receive_error();
    }
}
