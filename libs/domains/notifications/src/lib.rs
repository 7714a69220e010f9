//! Notifications Domain
//!
//! Turns domain events into transactional emails.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Kafka topic   │  ← { type, payload } envelopes
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   EventWorker   │  ← event-consumer: parse, trace, route
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  EventHandler   │  ← WelcomeEmailHandler, InvoiceEmailHandler
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │     Mailer      │  ← TemplateCache (Handlebars) + DeliveryChannel
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   SmtpChannel   │  ← lettre
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{handlers, FileTemplateSource, Mailer, SmtpChannel, TemplateCache};
//!
//! let templates = Arc::new(TemplateCache::new(FileTemplateSource::new("templates")));
//! let channel = Arc::new(SmtpChannel::new(SmtpConfig::from_env()?)?);
//! let registry = handlers::registry(Arc::new(Mailer::new(templates, channel)))?;
//! ```

pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod providers;
pub mod templates;

// Re-export commonly used types
pub use error::{NotificationError, NotificationResult};
pub use handlers::{InvoiceEmailHandler, WelcomeEmailHandler};
pub use mailer::{MailRequest, Mailer};
pub use models::{InvoicePayload, WelcomePayload, INVOICE_EVENT, WELCOME_EVENT};
pub use providers::{DeliveryChannel, DeliveryReceipt, OutboundEmail, SmtpChannel, SmtpConfig};
pub use templates::{
    FileTemplateSource, StaticTemplateSource, TemplateCache, TemplateConfig, TemplateSource,
};
