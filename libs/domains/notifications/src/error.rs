//! Error types for the notifications domain.

use event_consumer::ConsumerError;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// No template source exists for the name.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Template could not be loaded, compiled or rendered.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Email provider error.
    #[error("Email provider error: {0}")]
    ProviderError(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Payload passed shape checks but carries an unusable value.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for NotificationError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotificationError::ProviderError(format!("SMTP send failed: {}", err))
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}

/// Every domain failure surfaces to the consumer loop as a handler error.
impl From<NotificationError> for ConsumerError {
    fn from(err: NotificationError) -> Self {
        ConsumerError::Handler(err.to_string())
    }
}
