//! Trace context propagation and span management.
//!
//! `Telemetry` is constructed once at startup and handed down the call chain
//! (worker → handler → mailer) explicitly. Nothing here touches the
//! OpenTelemetry globals: extraction always starts from an empty context and
//! every span is parented to a context the caller passes in.
//!
//! Recognized header formats:
//! - Jaeger (`uber-trace-id`)
//! - W3C Trace Context (`traceparent`, `tracestate`)
//! - W3C Baggage (`baggage`)
//! - B3 multi-header (`x-b3-traceid`, `x-b3-spanid`, `x-b3-sampled`, ...)
//! - B3 single-header (`b3`)

use crate::error::{ConsumerError, ConsumerResult};
use crate::metadata::MessageMetadata;
use core_config::telemetry::TelemetryConfig;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::{
    Span as _, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_jaeger_propagator::Propagator as JaegerPropagator;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_zipkin::{B3Encoding, Propagator as B3Propagator};
use std::borrow::Cow;
use std::fmt;
use tracing::info;

/// Build the composite propagator used for every inbound message.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(JaegerPropagator::new()),
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
        Box::new(B3Propagator::with_encoding(B3Encoding::MultipleHeader)),
        Box::new(B3Propagator::with_encoding(B3Encoding::SingleHeader)),
    ])
}

/// Process-wide tracing handle: provider, tracer and propagator.
pub struct Telemetry {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    propagator: TextMapCompositePropagator,
    service_name: String,
}

impl Telemetry {
    /// Initialize tracing from configuration.
    ///
    /// With export enabled, spans are batched to the OTLP/gRPC collector.
    /// With export disabled, spans are still created (so context still
    /// propagates) but never leave the process.
    pub fn init(config: &TelemetryConfig) -> ConsumerResult<Self> {
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .build();

        let mut builder = SdkTracerProvider::builder().with_resource(resource);

        if config.export_enabled {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(config.otlp_endpoint.clone())
                .build()
                .map_err(|e| ConsumerError::Telemetry(e.to_string()))?;
            builder = builder.with_batch_exporter(exporter);
        }

        info!(
            service_name = %config.service_name,
            otlp_endpoint = %config.otlp_endpoint,
            export_enabled = config.export_enabled,
            "Trace provider initialized"
        );

        Ok(Self::from_provider(builder.build(), config.service_name.clone()))
    }

    /// Wrap an existing provider (used by tests with an in-memory exporter).
    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let tracer = provider.tracer(service_name.clone());
        Self {
            provider,
            tracer,
            propagator: composite_propagator(),
            service_name,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Extract the remote trace context carried in message headers.
    ///
    /// Returns an empty context when no recognized header is present, in
    /// which case spans parented to it start a new trace.
    pub fn extract(&self, metadata: &MessageMetadata) -> Context {
        self.propagator.extract_with_context(&Context::new(), metadata)
    }

    /// Start an internal span as a child of `parent`.
    pub fn start_span(
        &self,
        name: &'static str,
        parent: &Context,
        attributes: Vec<KeyValue>,
    ) -> SpanGuard {
        self.start_span_with_kind(name, SpanKind::Internal, parent, attributes)
    }

    /// Start a span of the given kind as a child of `parent`.
    pub fn start_span_with_kind(
        &self,
        name: &'static str,
        kind: SpanKind,
        parent: &Context,
        attributes: Vec<KeyValue>,
    ) -> SpanGuard {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);

        SpanGuard {
            name,
            cx: parent.with_span(span),
        }
    }

    /// Flush pending spans and stop the exporter.
    pub fn shutdown(&self) -> ConsumerResult<()> {
        self.provider
            .shutdown()
            .map_err(|e| ConsumerError::Telemetry(e.to_string()))
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

/// A started span. Ends the span when dropped, so every exit path
/// (return, `?`, panic unwind) closes it exactly once.
pub struct SpanGuard {
    name: &'static str,
    cx: Context,
}

impl SpanGuard {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Context carrying this span; pass it on to parent child spans.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Record the error as an exception event and mark the span failed.
    pub fn record_error(&self, err: &dyn std::error::Error) {
        let span = self.cx.span();
        span.record_error(err);
        span.set_status(Status::error(err.to_string()));
    }

    /// Mark the span failed without an exception event.
    pub fn fail(&self, description: impl Into<Cow<'static, str>>) {
        self.cx.span().set_status(Status::error(description));
    }

    pub fn succeed(&self) {
        self.cx.span().set_status(Status::Ok);
    }

    /// Hex trace id, for correlating log lines with traces.
    pub fn trace_id(&self) -> String {
        self.cx.span().span_context().trace_id().to_string()
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}
