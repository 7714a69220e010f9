//! Render-then-deliver for a single notification.
//!
//! `Mailer` ties the template cache to a delivery channel. Each send opens
//! two child spans under the caller's context: `render_template` and
//! `send_email`.

use crate::error::NotificationResult;
use crate::providers::{DeliveryChannel, DeliveryReceipt, OutboundEmail};
use crate::templates::TemplateCache;
use event_consumer::HandlerContext;
use opentelemetry::KeyValue;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// One templated email to send.
#[derive(Debug, Clone)]
pub struct MailRequest {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    /// Template name, resolved by the cache's naming convention
    pub template: &'static str,
    pub variables: Value,
}

/// Renders templates and hands the result to a delivery channel.
#[derive(Clone)]
pub struct Mailer {
    templates: Arc<TemplateCache>,
    channel: Arc<dyn DeliveryChannel>,
}

impl Mailer {
    pub fn new(templates: Arc<TemplateCache>, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self { templates, channel }
    }

    pub fn channel(&self) -> &Arc<dyn DeliveryChannel> {
        &self.channel
    }

    /// Render `request.template` and deliver it.
    pub async fn send(&self, cx: &HandlerContext, request: MailRequest) -> NotificationResult<DeliveryReceipt> {
        let html_body = self.render(cx, request.template, &request.variables)?;

        let email = OutboundEmail {
            to_email: request.to_email,
            to_name: request.to_name,
            subject: request.subject,
            html_body,
        };

        self.deliver(cx, &email).await
    }

    fn render(&self, cx: &HandlerContext, template: &'static str, variables: &Value) -> NotificationResult<String> {
        let span = cx.start_span("render_template", vec![KeyValue::new("template", template)]);

        match self.templates.render(template, variables) {
            Ok(html) => {
                span.set_attribute(KeyValue::new("template.bytes", html.len() as i64));
                span.succeed();
                debug!(template, bytes = html.len(), "Rendered template");
                Ok(html)
            }
            Err(e) => {
                span.record_error(&e);
                Err(e)
            }
        }
    }

    async fn deliver(&self, cx: &HandlerContext, email: &OutboundEmail) -> NotificationResult<DeliveryReceipt> {
        let span = cx.start_span(
            "send_email",
            vec![
                KeyValue::new("email.to", email.to_email.clone()),
                KeyValue::new("email.subject", email.subject.clone()),
                KeyValue::new("email.channel", self.channel.name()),
            ],
        );

        match self.channel.send(email).await {
            Ok(receipt) => {
                span.set_attribute(KeyValue::new("email.message_id", receipt.message_id.clone()));
                span.succeed();
                Ok(receipt)
            }
            Err(e) => {
                span.record_error(&e);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("templates", &self.templates)
            .field("channel", &self.channel.name())
            .finish()
    }
}
