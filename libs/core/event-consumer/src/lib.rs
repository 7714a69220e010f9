//! Event Consumer
//!
//! Consumes event envelopes from a Kafka topic, routes each one to the
//! handler registered for its `type`, and keeps going no matter what a
//! single message does.
//!
//! ## Features
//!
//! - **Typed dispatch**: `HandlerRegistry` maps an envelope type to one `EventHandler`
//! - **Trace propagation**: Jaeger, W3C, B3 headers parent the `handle_message` span
//! - **Failure isolation**: malformed, unroutable and failing messages are logged and skipped
//! - **Bounded handlers**: each invocation runs under a timeout
//! - **Prometheus metrics** and K8s-ready health endpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use event_consumer::{EventWorker, HandlerRegistry, KafkaSource, Telemetry, WorkerConfig};
//!
//! let telemetry = Arc::new(Telemetry::init(&TelemetryConfig::from_env()?)?);
//! let registry = HandlerRegistry::new().with(WelcomeEmailHandler::new(mailer))?;
//! let source = KafkaSource::connect(&KafkaConfig::from_env()?).await?;
//!
//! let mut worker = EventWorker::new(source, registry, telemetry, WorkerConfig::from_env()?);
//! worker.run(shutdown_rx).await;
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod kafka;
pub mod metadata;
pub mod metrics;
pub mod registry;
pub mod source;
pub mod telemetry;
pub mod worker;

pub use config::WorkerConfig;
pub use envelope::EventEnvelope;
pub use error::{ConsumerError, ConsumerResult};
pub use health::{health_router, HealthState};
pub use kafka::KafkaSource;
pub use metadata::MessageMetadata;
pub use registry::{EventHandler, HandlerContext, HandlerRegistry};
pub use source::{InMemorySource, MessageSource, ReceivedMessage};
pub use telemetry::{SpanGuard, Telemetry};
pub use worker::{EventWorker, MessageOutcome, WorkerStats};
