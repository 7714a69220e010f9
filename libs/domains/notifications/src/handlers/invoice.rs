//! Invoice email.

use super::{current_year, execute_with_tracing};
use crate::mailer::{MailRequest, Mailer};
use crate::models::{InvoicePayload, INVOICE_EVENT};
use async_trait::async_trait;
use event_consumer::{ConsumerError, ConsumerResult, EventEnvelope, EventHandler, HandlerContext};
use opentelemetry::KeyValue;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Template rendered for invoice emails.
pub const INVOICE_TEMPLATE: &str = "invoice";

/// Handles `invoice` events.
pub struct InvoiceEmailHandler {
    mailer: Arc<Mailer>,
}

impl InvoiceEmailHandler {
    pub fn new(mailer: Arc<Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventHandler for InvoiceEmailHandler {
    fn event_type(&self) -> &'static str {
        INVOICE_EVENT
    }

    fn name(&self) -> &'static str {
        "InvoiceEmailHandler"
    }

    async fn handle(&self, envelope: &EventEnvelope, cx: &HandlerContext) -> ConsumerResult<()> {
        let payload: InvoicePayload = envelope.payload_as()?;
        payload.validate().map_err(|e| ConsumerError::InvalidPayload {
            event_type: INVOICE_EVENT.to_string(),
            details: e.to_string(),
        })?;

        let attributes = vec![
            KeyValue::new("user.email", payload.email.clone()),
            KeyValue::new("user.name", payload.name.clone()),
            KeyValue::new("invoice.id", payload.invoice_id.clone()),
            KeyValue::new("invoice.amount", payload.amount),
            KeyValue::new("template", INVOICE_TEMPLATE),
        ];

        let request = MailRequest {
            to_email: payload.email.clone(),
            to_name: payload.name.clone(),
            subject: format!("Your invoice {}", payload.invoice_id),
            template: INVOICE_TEMPLATE,
            variables: json!({
                "name": payload.name,
                "invoiceId": payload.invoice_id,
                "amount": payload.formatted_amount(),
                "year": current_year(),
            }),
        };

        let receipt = execute_with_tracing(cx, "invoice_email_handler", attributes, |cx| async move {
            self.mailer.send(&cx, request).await
        })
        .await?;

        info!(
            to = %payload.email,
            invoice_id = %payload.invoice_id,
            message_id = %receipt.message_id,
            "Invoice email sent"
        );
        Ok(())
    }

    async fn health_check(&self) -> ConsumerResult<bool> {
        Ok(self.mailer.channel().health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{DeliveryReceipt, MockDeliveryChannel};
    use crate::templates::{StaticTemplateSource, TemplateCache};
    use crate::test_support::in_memory_context;

    fn handler(channel: MockDeliveryChannel) -> InvoiceEmailHandler {
        let templates = TemplateCache::new(
            StaticTemplateSource::new()
                .with_template(INVOICE_TEMPLATE, "{{name}}: {{invoiceId}} = {{amount}}"),
        );
        InvoiceEmailHandler::new(Arc::new(Mailer::new(Arc::new(templates), Arc::new(channel))))
    }

    #[tokio::test]
    async fn test_invoice_renders_amount_and_subject() {
        let mut channel = MockDeliveryChannel::new();
        channel.expect_name().return_const("mock");
        channel
            .expect_send()
            .withf(|email| {
                email.subject == "Your invoice INV-42" && email.html_body == "Ann: INV-42 = 19.90"
            })
            .times(1)
            .returning(|_| {
                Ok(DeliveryReceipt {
                    message_id: "<inv@b.com>".to_string(),
                })
            });

        let envelope = EventEnvelope::new(
            INVOICE_EVENT,
            json!({"email": "a@b.com", "name": "Ann", "invoiceId": "INV-42", "amount": 19.9}),
        );
        let (cx, exporter) = in_memory_context();

        handler(channel).handle(&envelope, &cx).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let span = spans.iter().find(|s| s.name == "invoice_email_handler").unwrap();
        assert!(span
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "invoice.id" && kv.value.as_str() == "INV-42"));
    }

    #[tokio::test]
    async fn test_negative_amount_rejected_without_delivery() {
        let mut channel = MockDeliveryChannel::new();
        channel.expect_send().never();

        let envelope = EventEnvelope::new(
            INVOICE_EVENT,
            json!({"email": "a@b.com", "name": "Ann", "invoiceId": "INV-1", "amount": -5}),
        );
        let (cx, _) = in_memory_context();

        let err = handler(channel).handle(&envelope, &cx).await.unwrap_err();
        assert!(matches!(err, ConsumerError::InvalidPayload { ref event_type, .. } if event_type == "invoice"));
    }
}
