//! The consumer loop.
//!
//! One message at a time: parse → extract trace context → open
//! `handle_message` → resolve handler → invoke under a timeout → close span.
//! Every per-message failure ends here as a logged `MessageOutcome`; only
//! shutdown or an exhausted source stops the loop.

use crate::config::WorkerConfig;
use crate::envelope::EventEnvelope;
use crate::error::ConsumerError;
use crate::metrics::ConsumerMetrics;
use crate::registry::{HandlerContext, HandlerRegistry};
use crate::source::{MessageSource, ReceivedMessage};
use crate::telemetry::Telemetry;
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Terminal state of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOutcome {
    /// Routed and the handler returned Ok
    Handled,
    /// Not a valid envelope (no value, bad JSON, missing/empty type)
    Malformed,
    /// Valid envelope, but no handler claims its type
    Unroutable,
    /// The handler returned an error or timed out
    Failed,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Handled => "handled",
            MessageOutcome::Malformed => "malformed",
            MessageOutcome::Unroutable => "unroutable",
            MessageOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counters for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub handled: u64,
    pub malformed: u64,
    pub unroutable: u64,
    pub failed: u64,
    pub receive_errors: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Handled => self.handled += 1,
            MessageOutcome::Malformed => self.malformed += 1,
            MessageOutcome::Unroutable => self.unroutable += 1,
            MessageOutcome::Failed => self.failed += 1,
        }
    }

    /// Messages that reached a terminal state.
    pub fn total(&self) -> u64 {
        self.handled + self.malformed + self.unroutable + self.failed
    }
}

/// Sequential event worker over any `MessageSource`.
pub struct EventWorker<S: MessageSource> {
    source: S,
    registry: Arc<HandlerRegistry>,
    telemetry: Arc<Telemetry>,
    config: WorkerConfig,
    metrics: ConsumerMetrics,
}

enum Next {
    Message(ReceivedMessage),
    ReceiveError(ConsumerError),
    Stop(&'static str),
}

impl<S: MessageSource> EventWorker<S> {
    pub fn new(
        source: S,
        registry: HandlerRegistry,
        telemetry: Arc<Telemetry>,
        config: WorkerConfig,
    ) -> Self {
        let metrics = ConsumerMetrics::new(source.topic());
        Self {
            source,
            registry: Arc::new(registry),
            telemetry,
            config,
            metrics,
        }
    }

    /// Shared handle on the registry (for health endpoints).
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run until shutdown is signalled or the source is exhausted.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        info!(
            source = %self.source.describe(),
            handlers = ?self.registry.event_types(),
            handler_timeout_ms = self.config.handler_timeout_ms,
            "Starting event worker"
        );

        let mut stats = WorkerStats::default();
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        Next::Stop("Received shutdown signal, stopping worker")
                    } else {
                        continue;
                    }
                }
                received = self.source.recv() => match received {
                    Some(Ok(message)) => Next::Message(message),
                    Some(Err(e)) => Next::ReceiveError(e),
                    None => Next::Stop("Message source exhausted, stopping worker"),
                },
            };

            match next {
                Next::Message(message) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Broker connection recovered");
                        consecutive_errors = 0;
                    }
                    stats.record(self.process_message(&message).await);
                }
                Next::ReceiveError(e) => {
                    consecutive_errors += 1;
                    stats.receive_errors += 1;
                    self.metrics.receive_error();

                    let backoff = self.config.backoff(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Error receiving message, backing off"
                    );

                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Next::Stop(reason) => {
                    info!("{}", reason);
                    break;
                }
            }
        }

        info!(
            handled = stats.handled,
            malformed = stats.malformed,
            unroutable = stats.unroutable,
            failed = stats.failed,
            receive_errors = stats.receive_errors,
            "Event worker stopped"
        );
        stats
    }

    /// Drive one message through the pipeline. Never fails.
    pub async fn process_message(&self, message: &ReceivedMessage) -> MessageOutcome {
        let started = Instant::now();
        self.metrics.message_received();

        let envelope = match message
            .payload
            .as_deref()
            .ok_or_else(|| ConsumerError::MalformedEnvelope("message has no value".to_string()))
            .and_then(EventEnvelope::parse)
        {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Error processing message: skipping malformed envelope"
                );
                return self.finish("unknown", MessageOutcome::Malformed, started);
            }
        };

        let parent = self.telemetry.extract(&message.metadata);
        let span = self.telemetry.start_span_with_kind(
            "handle_message",
            SpanKind::Consumer,
            &parent,
            vec![
                KeyValue::new("message.type", envelope.event_type.clone()),
                KeyValue::new("messaging.destination", message.topic.clone()),
                KeyValue::new("messaging.kafka.partition", i64::from(message.partition)),
                KeyValue::new("messaging.kafka.offset", message.offset),
            ],
        );

        let Some(handler) = self.registry.resolve(&envelope.event_type) else {
            let err = ConsumerError::UnknownType(envelope.event_type.clone());
            span.fail(err.to_string());
            error!(
                event_type = %envelope.event_type,
                trace_id = %span.trace_id(),
                offset = message.offset,
                error = %err,
                "Error processing message: no handler registered"
            );
            return self.finish("unknown", MessageOutcome::Unroutable, started);
        };

        debug!(
            event_type = %envelope.event_type,
            handler = handler.name(),
            trace_id = %span.trace_id(),
            "Dispatching event"
        );

        let cx = HandlerContext::new(Arc::clone(&self.telemetry), span.context().clone());
        let timeout = self.config.handler_timeout();
        let result = match tokio::time::timeout(timeout, handler.handle(&envelope, &cx)).await {
            Ok(result) => result,
            Err(_) => Err(ConsumerError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                span.succeed();
                info!(
                    event_type = %envelope.event_type,
                    handler = handler.name(),
                    trace_id = %span.trace_id(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Event handled"
                );
                self.finish(handler.event_type(), MessageOutcome::Handled, started)
            }
            Err(e) => {
                span.record_error(&e);
                error!(
                    event_type = %envelope.event_type,
                    handler = handler.name(),
                    trace_id = %span.trace_id(),
                    error_kind = e.kind(),
                    error = %e,
                    "Error processing message: handler failed"
                );
                self.finish(handler.event_type(), MessageOutcome::Failed, started)
            }
        }
    }

    fn finish(&self, event_type: &str, outcome: MessageOutcome, started: Instant) -> MessageOutcome {
        self.metrics
            .message_processed(event_type, outcome.as_str(), started.elapsed());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsumerResult;
    use crate::metadata::MessageMetadata;
    use crate::registry::EventHandler;
    use crate::source::InMemorySource;
    use crate::telemetry::tests::in_memory_telemetry;
    use async_trait::async_trait;
    use opentelemetry::trace::Status;
    use opentelemetry_sdk::trace::InMemorySpanExporter;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Arc<RecordingHandler> {
        fn event_type(&self) -> &'static str {
            "welcome"
        }

        fn name(&self) -> &'static str {
            "RecordingHandler"
        }

        async fn handle(&self, envelope: &EventEnvelope, cx: &HandlerContext) -> ConsumerResult<()> {
            let _span = cx.start_span("welcome_email_handler", vec![]);
            if envelope.payload.get("email").is_none() {
                return Err(ConsumerError::InvalidPayload {
                    event_type: "welcome".to_string(),
                    details: "missing field `email`".to_string(),
                });
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct HangingHandler;

    #[async_trait]
    impl EventHandler for HangingHandler {
        fn event_type(&self) -> &'static str {
            "hang"
        }

        fn name(&self) -> &'static str {
            "HangingHandler"
        }

        async fn handle(&self, _: &EventEnvelope, cx: &HandlerContext) -> ConsumerResult<()> {
            let _span = cx.start_span("hang_handler", vec![]);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn worker(
        source: InMemorySource,
    ) -> (EventWorker<InMemorySource>, Arc<RecordingHandler>, InMemorySpanExporter) {
        let (telemetry, exporter) = in_memory_telemetry();
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new()
            .with(Arc::clone(&handler))
            .and_then(|r| r.with(HangingHandler))
            .unwrap();
        let config = WorkerConfig::new().with_handler_timeout(Duration::from_millis(50));

        (
            EventWorker::new(source, registry, Arc::new(telemetry), config),
            handler,
            exporter,
        )
    }

    fn welcome_bytes() -> Vec<u8> {
        EventEnvelope::new("welcome", json!({"email": "a@b.com", "name": "Ann"}))
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_type_then_valid_event() {
        let mut source = InMemorySource::new("notifications");
        source.push_bytes(br#"{"type":"invoice_v9","payload":{}}"#.to_vec());
        source.push_bytes(welcome_bytes());

        let (mut worker, handler, exporter) = worker(source);
        let (_tx, rx) = watch::channel(false);
        let stats = worker.run(rx).await;

        assert_eq!(stats.unroutable, 1);
        assert_eq!(stats.handled, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let spans = exporter.get_finished_spans().unwrap();
        let message_spans: Vec<_> = spans.iter().filter(|s| s.name == "handle_message").collect();
        assert_eq!(message_spans.len(), 2);
        assert_eq!(
            message_spans[0].status,
            Status::Error {
                description: "unknown type invoice_v9".into()
            }
        );
        assert_eq!(message_spans[1].status, Status::Ok);
    }

    #[tokio::test]
    async fn test_malformed_messages_do_not_stop_loop() {
        let mut source = InMemorySource::new("notifications");
        source.push_bytes(b"{not json".to_vec());
        source.push_bytes(br#"{"payload":{}}"#.to_vec());
        source.push(ReceivedMessage::default());
        source.push_bytes(welcome_bytes());

        let (mut worker, handler, exporter) = worker(source);
        let (_tx, rx) = watch::channel(false);
        let stats = worker.run(rx).await;

        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.handled, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        // Malformed messages never open a span
        assert_eq!(
            exporter
                .get_finished_spans()
                .unwrap()
                .iter()
                .filter(|s| s.name == "handle_message")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_handler_error_recorded_and_swallowed() {
        let mut source = InMemorySource::new("notifications");
        source.push_bytes(br#"{"type":"welcome","payload":{"name":"Ann"}}"#.to_vec());
        source.push_bytes(welcome_bytes());

        let (mut worker, handler, exporter) = worker(source);
        let (_tx, rx) = watch::channel(false);
        let stats = worker.run(rx).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.handled, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let spans = exporter.get_finished_spans().unwrap();
        let failed = spans
            .iter()
            .find(|s| s.name == "handle_message" && matches!(s.status, Status::Error { .. }))
            .unwrap();
        assert!(failed.events.events.iter().any(|e| e.name == "exception"));

        // Every span opened was closed exactly once
        assert_eq!(spans.iter().filter(|s| s.name == "handle_message").count(), 2);
        assert_eq!(spans.iter().filter(|s| s.name == "welcome_email_handler").count(), 2);
    }

    #[tokio::test]
    async fn test_handler_timeout_becomes_failure() {
        let (mut worker, _, exporter) = worker(InMemorySource::new("notifications"));
        let message = ReceivedMessage::new("notifications", br#"{"type":"hang","payload":{}}"#.to_vec());

        let outcome = worker.process_message(&message).await;
        assert_eq!(outcome, MessageOutcome::Failed);

        let spans = exporter.get_finished_spans().unwrap();
        let outer = spans.iter().find(|s| s.name == "handle_message").unwrap();
        let inner = spans.iter().find(|s| s.name == "hang_handler").unwrap();
        assert!(matches!(outer.status, Status::Error { ref description } if description.contains("timed out")));
        assert_eq!(inner.parent_span_id, outer.span_context.span_id());

        // Loop still runs afterwards
        let (_tx, rx) = watch::channel(false);
        assert_eq!(worker.run(rx).await.total(), 0);
    }

    #[tokio::test]
    async fn test_handle_message_parented_to_remote_trace() {
        let metadata = MessageMetadata::new().with_header(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        );
        let message = ReceivedMessage::new("notifications", welcome_bytes())
            .with_metadata(metadata)
            .with_position(3, 42);

        let (worker, _, exporter) = worker(InMemorySource::new("notifications"));
        assert_eq!(worker.process_message(&message).await, MessageOutcome::Handled);

        let spans = exporter.get_finished_spans().unwrap();
        let outer = spans.iter().find(|s| s.name == "handle_message").unwrap();
        let inner = spans.iter().find(|s| s.name == "welcome_email_handler").unwrap();

        assert_eq!(
            outer.span_context.trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
        assert_eq!(outer.parent_span_id.to_string(), "b7ad6b7169203331");
        assert_eq!(inner.parent_span_id, outer.span_context.span_id());
        assert!(outer
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "message.type" && kv.value.as_str() == "welcome"));
        assert!(outer
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "messaging.kafka.offset" && kv.value == opentelemetry::Value::I64(42)));
    }

    #[tokio::test]
    async fn test_receive_errors_back_off_and_continue() {
        tokio::time::pause();

        let mut source = InMemorySource::new("notifications");
        source.push_error(ConsumerError::Broker(rdkafka::error::KafkaError::NoMessageReceived));
        source.push_bytes(welcome_bytes());

        let (mut worker, handler, _) = worker(source);
        let (_tx, rx) = watch::channel(false);
        let stats = worker.run(rx).await;

        assert_eq!(stats.receive_errors, 1);
        assert_eq!(stats.handled, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_message() {
        let mut source = InMemorySource::new("notifications");
        source.push_bytes(welcome_bytes());

        let (mut worker, handler, _) = worker(source);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let stats = worker.run(rx).await;
        assert_eq!(stats.total(), 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.source().remaining(), 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(MessageOutcome::Handled.to_string(), "handled");
        assert_eq!(MessageOutcome::Unroutable.as_str(), "unroutable");
    }
}
