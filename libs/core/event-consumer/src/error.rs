//! Consumer error types
//!
//! Errors split into two groups:
//! - **Per-message**: malformed envelope, unknown type, invalid payload,
//!   handler failure, timeout. These are isolated at the loop boundary.
//! - **Startup**: broker, configuration, telemetry, duplicate registration,
//!   failed startup task.
//!   These terminate the process before the loop starts.

use std::time::Duration;
use thiserror::Error;

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors raised while consuming and dispatching events.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Broker connection, subscription or receive error
    #[error("Broker error: {0}")]
    Broker(#[from] rdkafka::error::KafkaError),

    /// Message bytes are not a valid envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No handler registered for the envelope type
    #[error("unknown type {0}")]
    UnknownType(String),

    /// Envelope payload does not match the handler's expected shape
    #[error("Invalid payload for '{event_type}': {details}")]
    InvalidPayload { event_type: String, details: String },

    /// Handler failed while rendering or delivering
    #[error("Handler error: {0}")]
    Handler(String),

    /// Handler did not finish within the configured bound
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    /// Two handlers claimed the same event type
    #[error("Handler already registered for type '{0}'")]
    DuplicateHandler(String),

    /// Blocking startup work was cancelled or panicked
    #[error("Startup task failed: {0}")]
    Startup(String),

    /// Tracing provider or exporter setup failed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] core_config::ConfigError),
}

impl ConsumerError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsumerError::Broker(_) => "broker",
            ConsumerError::MalformedEnvelope(_) => "malformed",
            ConsumerError::UnknownType(_) => "unroutable",
            ConsumerError::InvalidPayload { .. } => "invalid_payload",
            ConsumerError::Handler(_) => "handler",
            ConsumerError::Timeout(_) => "timeout",
            ConsumerError::DuplicateHandler(_) => "duplicate_handler",
            ConsumerError::Startup(_) => "startup",
            ConsumerError::Telemetry(_) => "telemetry",
            ConsumerError::Config(_) => "config",
        }
    }
}
