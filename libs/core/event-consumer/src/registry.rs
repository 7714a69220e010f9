//! Handler trait and the type → handler registry.
//!
//! The registry is filled once at startup and then moved into the worker,
//! which only ever reads from it. Adding an event type means writing one
//! `EventHandler` and registering it; nothing else changes.

use crate::envelope::EventEnvelope;
use crate::error::{ConsumerError, ConsumerResult};
use crate::telemetry::{SpanGuard, Telemetry};
use async_trait::async_trait;
use opentelemetry::{Context, KeyValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-message context handed to a handler.
///
/// Carries the telemetry handle and the `handle_message` span context, so
/// every span a handler opens lands in the message's trace.
#[derive(Clone)]
pub struct HandlerContext {
    telemetry: Arc<Telemetry>,
    parent: Context,
}

impl HandlerContext {
    pub fn new(telemetry: Arc<Telemetry>, parent: Context) -> Self {
        Self { telemetry, parent }
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn parent(&self) -> &Context {
        &self.parent
    }

    /// Open a span parented to the message span.
    pub fn start_span(&self, name: &'static str, attributes: Vec<KeyValue>) -> SpanGuard {
        self.telemetry.start_span(name, &self.parent, attributes)
    }

    /// Derive a context for a nested call, parented to `span`.
    pub fn child(&self, span: &SpanGuard) -> Self {
        Self {
            telemetry: Arc::clone(&self.telemetry),
            parent: span.context().clone(),
        }
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("service_name", &self.telemetry.service_name())
            .finish_non_exhaustive()
    }
}

/// A handler for exactly one event type.
///
/// Implementations extract their payload from the envelope, do their work
/// inside their own span, and return an error instead of panicking on bad
/// input. The worker records and swallows whatever they return.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The envelope `type` this handler claims (exact, case-sensitive).
    fn event_type(&self) -> &'static str;

    /// Handler name for logging.
    fn name(&self) -> &'static str;

    /// Process one envelope.
    async fn handle(&self, envelope: &EventEnvelope, cx: &HandlerContext) -> ConsumerResult<()>;

    /// Health check for the handler's downstream dependencies.
    /// Default: always returns Ok(true).
    async fn health_check(&self) -> ConsumerResult<bool> {
        Ok(true)
    }
}

/// Static mapping from event type to handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared event type.
    ///
    /// Fails if another handler already claims that type.
    pub fn register<H>(&mut self, handler: H) -> ConsumerResult<()>
    where
        H: EventHandler + 'static,
    {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn EventHandler>) -> ConsumerResult<()> {
        let event_type = handler.event_type();
        if self.handlers.contains_key(event_type) {
            return Err(ConsumerError::DuplicateHandler(event_type.to_string()));
        }

        tracing::debug!(event_type, handler = handler.name(), "Registered event handler");
        self.handlers.insert(event_type.to_string(), handler);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with<H>(mut self, handler: H) -> ConsumerResult<Self>
    where
        H: EventHandler + 'static,
    {
        self.register(handler)?;
        Ok(self)
    }

    /// Look up the handler for an event type.
    pub fn resolve(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler's health check. Returns the first failing type.
    pub async fn health_check(&self) -> Result<(), String> {
        for event_type in self.event_types() {
            let handler = &self.handlers[event_type];
            match handler.health_check().await {
                Ok(true) => {}
                Ok(false) => return Err(format!("{event_type}: unhealthy")),
                Err(e) => return Err(format!("{event_type}: {e}")),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}
