//! Event payloads handled by the notification worker.
//!
//! Field names follow the producer's camelCase wire format.

use crate::error::{NotificationError, NotificationResult};
use serde::{Deserialize, Serialize};

/// Envelope `type` for new-user welcome emails.
pub const WELCOME_EVENT: &str = "welcome";

/// Envelope `type` for invoice emails.
pub const INVOICE_EVENT: &str = "invoice";

/// Payload of a `welcome` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomePayload {
    pub email: String,
    pub name: String,
}

/// Payload of an `invoice` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub email: String,
    pub name: String,
    pub invoice_id: String,
    pub amount: f64,
}

impl InvoicePayload {
    /// Reject amounts that cannot be billed.
    pub fn validate(&self) -> NotificationResult<()> {
        if self.invoice_id.trim().is_empty() {
            return Err(NotificationError::InvalidPayload(
                "invoiceId is empty".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(NotificationError::InvalidPayload(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    /// Amount rendered with two decimals.
    pub fn formatted_amount(&self) -> String {
        format!("{:.2}", self.amount)
    }
}
