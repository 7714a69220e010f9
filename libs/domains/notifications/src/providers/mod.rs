//! Delivery channels.
//!
//! This module contains the `DeliveryChannel` trait and the SMTP
//! implementation used by the worker.

mod smtp;

pub use smtp::{SmtpChannel, SmtpConfig};

use crate::error::NotificationResult;
use async_trait::async_trait;

/// Result of handing a message to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Identifier of the delivered message (the `Message-ID` for SMTP).
    pub message_id: String,
}

/// A fully rendered email, ready for the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient email address.
    pub to_email: String,
    /// Recipient display name (may be empty).
    pub to_name: String,
    pub subject: String,
    /// HTML body content.
    pub html_body: String,
}

/// Outbound transport for rendered notifications.
///
/// One call is one delivery attempt; implementations never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Hand the email to the transport.
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<DeliveryReceipt>;

    /// Get the channel name for logging.
    fn name(&self) -> &'static str;

    /// Check if the transport is reachable.
    async fn health_check(&self) -> NotificationResult<bool>;
}
