//! Welcome email for newly registered users.

use super::{current_year, execute_with_tracing};
use crate::mailer::{MailRequest, Mailer};
use crate::models::{WelcomePayload, WELCOME_EVENT};
use async_trait::async_trait;
use event_consumer::{ConsumerResult, EventEnvelope, EventHandler, HandlerContext};
use opentelemetry::KeyValue;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Template rendered for welcome emails.
pub const WELCOME_TEMPLATE: &str = "welcome";

pub const WELCOME_SUBJECT: &str = "Your training is just getting started: greetings from FitnessThing 💪";

/// Handles `welcome` events.
pub struct WelcomeEmailHandler {
    mailer: Arc<Mailer>,
}

impl WelcomeEmailHandler {
    pub fn new(mailer: Arc<Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventHandler for WelcomeEmailHandler {
    fn event_type(&self) -> &'static str {
        WELCOME_EVENT
    }

    fn name(&self) -> &'static str {
        "WelcomeEmailHandler"
    }

    async fn handle(&self, envelope: &EventEnvelope, cx: &HandlerContext) -> ConsumerResult<()> {
        let payload: WelcomePayload = envelope.payload_as()?;

        let attributes = vec![
            KeyValue::new("user.email", payload.email.clone()),
            KeyValue::new("user.name", payload.name.clone()),
            KeyValue::new("template", WELCOME_TEMPLATE),
        ];

        let request = MailRequest {
            to_email: payload.email.clone(),
            to_name: payload.name.clone(),
            subject: WELCOME_SUBJECT.to_string(),
            template: WELCOME_TEMPLATE,
            variables: json!({ "name": payload.name, "year": current_year() }),
        };

        let receipt = execute_with_tracing(cx, "welcome_email_handler", attributes, |cx| async move {
            self.mailer.send(&cx, request).await
        })
        .await?;

        info!(
            to = %payload.email,
            message_id = %receipt.message_id,
            "Welcome email sent"
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
    use crate::error::NotificationError;
    use crate::providers::{DeliveryReceipt, MockDeliveryChannel};
    use crate::templates::{StaticTemplateSource, TemplateCache};
    use crate::test_support::in_memory_context;
    use event_consumer::ConsumerError;
    use opentelemetry::trace::Status;

    fn mailer(channel: MockDeliveryChannel) -> Arc<Mailer> {
        let templates = TemplateCache::new(
            StaticTemplateSource::new().with_template(WELCOME_TEMPLATE, "<p>Hi {{name}}, {{year}}</p>"),
        );
        Arc::new(Mailer::new(Arc::new(templates), Arc::new(channel)))
    }

    #[tokio::test]
    async fn test_welcome_renders_and_delivers() {
        let expected_body = format!("<p>Hi Ann, {}</p>", current_year());

        let mut channel = MockDeliveryChannel::new();
        channel.expect_name().return_const("mock");
        channel
            .expect_send()
            .withf(move |email| {
                email.to_email == "a@b.com"
                    && email.to_name == "Ann"
                    && email.subject == WELCOME_SUBJECT
                    && email.html_body == expected_body
            })
            .times(1)
            .returning(|_| {
                Ok(DeliveryReceipt {
                    message_id: "<welcome@b.com>".to_string(),
                })
            });

        let handler = WelcomeEmailHandler::new(mailer(channel));
        let envelope = EventEnvelope::new(WELCOME_EVENT, json!({"email": "a@b.com", "name": "Ann"}));
        let (cx, exporter) = in_memory_context();

        handler.handle(&envelope, &cx).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let handler_span = spans.iter().find(|s| s.name == "welcome_email_handler").unwrap();
        let send_span = spans.iter().find(|s| s.name == "send_email").unwrap();
        let render_span = spans.iter().find(|s| s.name == "render_template").unwrap();

        assert_eq!(handler_span.status, Status::Ok);
        assert_eq!(send_span.parent_span_id, handler_span.span_context.span_id());
        assert_eq!(render_span.parent_span_id, handler_span.span_context.span_id());
        assert!(handler_span
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "user.email" && kv.value.as_str() == "a@b.com"));
    }

    #[tokio::test]
    async fn test_missing_field_fails_before_span() {
        let mut channel = MockDeliveryChannel::new();
        channel.expect_send().never();

        let handler = WelcomeEmailHandler::new(mailer(channel));
        let envelope = EventEnvelope::new(WELCOME_EVENT, json!({"email": "a@b.com"}));
        let (cx, exporter) = in_memory_context();

        let err = handler.handle(&envelope, &cx).await.unwrap_err();
        assert!(matches!(err, ConsumerError::InvalidPayload { .. }));
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_recorded_and_returned() {
        let mut channel = MockDeliveryChannel::new();
        channel.expect_name().return_const("mock");
        channel
            .expect_send()
            .times(1)
            .returning(|_| Err(NotificationError::ProviderError("recipient rejected".to_string())));

        let handler = WelcomeEmailHandler::new(mailer(channel));
        let envelope = EventEnvelope::new(WELCOME_EVENT, json!({"email": "a@b.com", "name": "Ann"}));
        let (cx, exporter) = in_memory_context();

        let err = handler.handle(&envelope, &cx).await.unwrap_err();
        assert!(matches!(err, ConsumerError::Handler(ref msg) if msg.contains("recipient rejected")));

        let spans = exporter.get_finished_spans().unwrap();
        let handler_span = spans.iter().find(|s| s.name == "welcome_email_handler").unwrap();
        assert!(matches!(handler_span.status, Status::Error { .. }));
        assert!(handler_span.events.events.iter().any(|e| e.name == "exception"));
    }

    #[tokio::test]
    async fn test_health_check_uses_channel() {
        let mut channel = MockDeliveryChannel::new();
        channel
            .expect_health_check()
            .returning(|| Err(NotificationError::ProviderError("SMTP health check failed".to_string())));

        let handler = WelcomeEmailHandler::new(mailer(channel));
        assert!(handler.health_check().await.is_err());
    }
}
