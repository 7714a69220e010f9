//! Event handlers, one per envelope type.
//!
//! Each handler extracts its payload, then renders and delivers inside its
//! own span. On failure the span records the error and the error is still
//! returned, so the consumer loop records it on `handle_message` as well.

mod invoice;
mod welcome;

pub use invoice::{InvoiceEmailHandler, INVOICE_TEMPLATE};
pub use welcome::{WelcomeEmailHandler, WELCOME_SUBJECT, WELCOME_TEMPLATE};

use crate::error::NotificationResult;
use crate::mailer::Mailer;
use chrono::{Datelike, Utc};
use event_consumer::{ConsumerResult, HandlerContext, HandlerRegistry};
use opentelemetry::KeyValue;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Registry with every notification handler wired to `mailer`.
pub fn registry(mailer: Arc<Mailer>) -> ConsumerResult<HandlerRegistry> {
    HandlerRegistry::new()
        .with(WelcomeEmailHandler::new(Arc::clone(&mailer)))?
        .with(InvoiceEmailHandler::new(mailer))
}

/// Current calendar year (UTC), exposed to templates as `year`.
pub(crate) fn current_year() -> i32 {
    Utc::now().year()
}

/// Run `f` inside a span named `operation`, parented to `cx`.
///
/// The span ends on every exit path. Errors are recorded on it, logged, and
/// returned unchanged.
pub(crate) async fn execute_with_tracing<T, F, Fut>(
    cx: &HandlerContext,
    operation: &'static str,
    attributes: Vec<KeyValue>,
    f: F,
) -> NotificationResult<T>
where
    F: FnOnce(HandlerContext) -> Fut,
    Fut: Future<Output = NotificationResult<T>>,
{
    let span = cx.start_span(operation, attributes);

    match f(cx.child(&span)).await {
        Ok(value) => {
            span.succeed();
            Ok(value)
        }
        Err(e) => {
            span.record_error(&e);
            error!(operation, trace_id = %span.trace_id(), error = %e, "Error in {}", operation);
            Err(e)
        }
    }
}
