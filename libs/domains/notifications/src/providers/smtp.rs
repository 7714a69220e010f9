//! SMTP delivery channel using lettre.
//!
//! TLS is optional so the same channel works against production relays and
//! local capture servers like Mailpit.

use super::{DeliveryChannel, DeliveryReceipt, OutboundEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{env_flag, env_or_default, env_parse, ConfigError, FromEnv};
use lettre::{
    message::{header::ContentType, Mailbox},
    Address,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Default sender address.
    pub from_email: String,
    /// Default sender name.
    pub from_name: String,
    /// SMTP username (optional for dev servers like Mailpit).
    pub username: Option<String>,
    /// SMTP password (optional for dev servers like Mailpit).
    pub password: Option<String>,
    /// Whether to use TLS (false for local dev servers).
    pub use_tls: bool,
    /// Per-command network timeout.
    pub timeout_secs: u64,
}

impl SmtpConfig {
    /// Create a new SMTP configuration.
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
            timeout_secs: 10,
        }
    }

    /// Builder method to set TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// The `From` mailbox for every outbound message.
    pub fn from_mailbox(&self) -> NotificationResult<Mailbox> {
        let address: Address = self
            .from_email
            .parse()
            .map_err(|e| NotificationError::ConfigError(format!("Invalid from address: {}", e)))?;
        Ok(mailbox(&self.from_name, address))
    }

    /// Domain part of the sender address, used for generated Message-IDs.
    fn message_id_domain(&self) -> &str {
        self.from_email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost")
    }
}

impl FromEnv for SmtpConfig {
    /// Reads:
    /// - SMTP_HOST: defaults to localhost
    /// - SMTP_PORT: defaults to 1025 (Mailpit)
    /// - SMTP_FROM_EMAIL: defaults to noreply@localhost
    /// - SMTP_FROM_NAME: defaults to FitnessThing
    /// - SMTP_USERNAME / SMTP_PASSWORD: optional, used only when both are set
    /// - SMTP_USE_TLS: defaults to false
    /// - SMTP_TIMEOUT_SECS: defaults to 10
    fn from_env() -> Result<Self, ConfigError> {
        let optional = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse("SMTP_PORT", 1025u16)?,
            from_email: env_or_default("SMTP_FROM_EMAIL", "noreply@localhost"),
            from_name: env_or_default("SMTP_FROM_NAME", "FitnessThing"),
            username: optional("SMTP_USERNAME"),
            password: optional("SMTP_PASSWORD"),
            use_tls: env_flag("SMTP_USE_TLS", false)?,
            timeout_secs: env_parse("SMTP_TIMEOUT_SECS", 10u64)?,
        })
    }
}

/// SMTP delivery channel.
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
    from: Mailbox,
}

impl SmtpChannel {
    /// Create a new SMTP channel. No connection is opened until the first send.
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let from = config.from_mailbox()?;
        let transport = Self::build_transport(&config)?;

        info!(
            host = %config.host,
            port = config.port,
            tls = config.use_tls,
            from = %config.from_email,
            "SMTP channel configured"
        );

        Ok(Self {
            transport,
            config,
            from,
        })
    }

    /// Build the SMTP transport based on configuration.
    fn build_transport(config: &SmtpConfig) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if config.use_tls {
            // TLS-enabled transport (for production SMTP servers)
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotificationError::ProviderError(format!("Failed to create SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    /// Build a lettre Message, returning it with the Message-ID it carries.
    fn build_message(&self, email: &OutboundEmail) -> NotificationResult<(Message, String)> {
        let address: Address = email
            .to_email
            .parse()
            .map_err(|e| NotificationError::InvalidEmail(format!("{}: {}", email.to_email, e)))?;
        let to = mailbox(&email.to_name, address);

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.config.message_id_domain());

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| NotificationError::ProviderError(format!("Failed to build email message: {}", e)))?;

        Ok((message, message_id))
    }
}

/// Mailbox with an optional display name. `Mailbox::new` quotes names that
/// contain specials (`,` `(` `"` ...) when the header is written.
fn mailbox(name: &str, address: Address) -> Mailbox {
    let name = name.trim();
    Mailbox::new((!name.is_empty()).then(|| name.to_string()), address)
}

#[async_trait]
impl DeliveryChannel for SmtpChannel {
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<DeliveryReceipt> {
        debug!(
            to = %email.to_email,
            subject = %email.subject,
            host = %self.config.host,
            port = self.config.port,
            "Sending email via SMTP"
        );

        let (message, message_id) = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %email.to_email, error = %e, "Failed to send email via SMTP");
            NotificationError::from(e)
        })?;

        info!(
            to = %email.to_email,
            message_id = %message_id,
            code = %response.code(),
            "Email sent successfully via SMTP"
        );

        Ok(DeliveryReceipt { message_id })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::ProviderError(format!("SMTP health check failed: {}", e)))
    }
}
