use crate::{env_flag, env_or_default, ConfigError, FromEnv};

/// Distributed tracing export configuration
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Service identity reported on every span
    pub service_name: String,
    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,
    /// When false, spans are still created but nothing is exported
    pub export_enabled: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, otlp_endpoint: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            otlp_endpoint: otlp_endpoint.into(),
            export_enabled: true,
        }
    }

    pub fn disabled(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            otlp_endpoint: String::new(),
            export_enabled: false,
        }
    }
}

impl FromEnv for TelemetryConfig {
    /// Reads:
    /// - SERVICE_NAME: defaults to email-service
    /// - OTLP_ENDPOINT: defaults to http://localhost:4317
    /// - TRACING_ENABLED: defaults to true
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            service_name: env_or_default("SERVICE_NAME", "email-service"),
            otlp_endpoint: env_or_default("OTLP_ENDPOINT", "http://localhost:4317"),
            export_enabled: env_flag("TRACING_ENABLED", true)?,
        })
    }
}
