//! Email Worker Service
//!
//! Consumes notification events from Kafka and sends the matching email.
//!
//! ## Architecture
//!
//! ```text
//! Kafka topic (KAFKA_TOPIC)
//!   ↓ (Consumer Group: KAFKA_GROUP_ID)
//! EventWorker<KafkaSource>
//!   ↓ (routes on envelope `type`)
//! WelcomeEmailHandler / InvoiceEmailHandler
//!   ↓ (renders templates)
//! TemplateCache (Handlebars)
//!   ↓ (sends emails)
//! SmtpChannel (lettre)
//! ```
//!
//! ## Features
//!
//! - Trace context from Jaeger, W3C and B3 headers parents every span
//! - Per-message failure isolation: a bad message is logged and skipped
//! - Bounded handler execution
//! - Graceful shutdown handling
//! - Health check and metrics endpoint for Kubernetes probes

use core_config::health::HealthConfig;
use core_config::kafka::KafkaConfig;
use core_config::telemetry::TelemetryConfig;
use core_config::{Environment, FromEnv};
use domain_notifications::{
    handlers, FileTemplateSource, Mailer, SmtpChannel, SmtpConfig, TemplateCache, TemplateConfig,
};
use event_consumer::{
    health_router, metrics, EventWorker, HealthState, KafkaSource, Telemetry, WorkerConfig,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start the health HTTP server
///
/// Provides endpoints for:
/// - Liveness probes: `/health`, `/healthz`
/// - Readiness probes: `/ready`, `/readyz`
/// - Prometheus metrics: `/metrics`
async fn start_health_server(health_state: HealthState, config: HealthConfig) -> Result<()> {
    let app = health_router(health_state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(address = %addr, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the email worker
///
/// 1. Sets up structured logging (JSON for prod, pretty for dev) and metrics
/// 2. Loads every configuration section from the environment
/// 3. Builds telemetry, the SMTP channel, templates and the handler registry
/// 4. Connects to Kafka and consumes until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if configuration is invalid, telemetry cannot start,
/// or the broker cannot be reached at startup. Per-message failures never
/// surface here.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    info!(name = APP_NAME, version = APP_VERSION, "Starting email worker service");
    info!("Environment: {:?}", environment);

    let kafka_config = KafkaConfig::from_env().wrap_err("Failed to load Kafka configuration")?;
    let telemetry_config =
        TelemetryConfig::from_env().wrap_err("Failed to load telemetry configuration")?;
    let worker_config = WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?;
    let smtp_config = SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?;
    let template_config =
        TemplateConfig::from_env().wrap_err("Failed to load template configuration")?;
    let health_config = HealthConfig::from_env().wrap_err("Failed to load health configuration")?;

    info!(
        brokers = %kafka_config.bootstrap_servers(),
        topic = %kafka_config.topic,
        group_id = %kafka_config.group_id,
        handler_timeout_ms = worker_config.handler_timeout_ms,
        "Worker configuration loaded"
    );

    let telemetry = Arc::new(
        Telemetry::init(&telemetry_config).wrap_err("Failed to initialize telemetry")?,
    );

    let channel = Arc::new(SmtpChannel::new(smtp_config).wrap_err("Failed to create SMTP channel")?);
    let templates = Arc::new(TemplateCache::new(FileTemplateSource::from_config(
        &template_config,
    )));
    let mailer = Arc::new(Mailer::new(templates, channel));
    let registry = handlers::registry(mailer).wrap_err("Failed to register handlers")?;

    // Broker unreachable at startup is fatal; later receive errors are retried by the worker
    info!("Connecting to Kafka...");
    let source = KafkaSource::connect(&kafka_config)
        .await
        .wrap_err("Failed to connect to Kafka")?;
    info!("Connected to Kafka successfully");

    let mut worker = EventWorker::new(source, registry, Arc::clone(&telemetry), worker_config);

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        APP_NAME,
        APP_VERSION,
        kafka_config.topic.clone(),
        worker.registry(),
    );

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_config).await {
            error!(error = %e, "Health server failed");
        }
    });

    let stats = worker.run(shutdown_rx).await;
    info!(processed = stats.total(), "Worker drained");

    if let Err(e) = telemetry.shutdown() {
        warn!(error = %e, "Failed to flush spans on shutdown");
    }

    info!("Email worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
