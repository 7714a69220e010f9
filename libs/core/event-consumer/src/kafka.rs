//! Kafka message source
//!
//! Wraps an `rdkafka` `StreamConsumer` subscribed to a single topic under one
//! consumer group. Offsets are auto-committed: a message counts as consumed
//! once it has been received, whatever the handler outcome.

use crate::error::{ConsumerError, ConsumerResult};
use crate::metadata::MessageMetadata;
use crate::source::{MessageSource, ReceivedMessage};
use async_trait::async_trait;
use core_config::kafka::KafkaConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::time::Duration;
use tracing::{debug, info};

/// Build the librdkafka client configuration for a consumer.
pub fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("group.id", &config.group_id)
        .set("client.id", &config.client_id)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("session.timeout.ms", config.session_timeout_ms.to_string())
        .set("enable.auto.commit", "true")
        .set("enable.partition.eof", "false");
    client
}

/// Kafka-backed `MessageSource`.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
}

impl KafkaSource {
    /// Create the consumer, subscribe, and confirm the topic is reachable.
    ///
    /// The metadata fetch blocks for up to `metadata_timeout_ms`, so it runs
    /// on the blocking pool. Any failure here is a startup failure: the
    /// caller should exit.
    pub async fn connect(config: &KafkaConfig) -> ConsumerResult<Self> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::connect_blocking(&config))
            .await
            .map_err(|e| ConsumerError::Startup(format!("Kafka connect task failed: {}", e)))?
    }

    fn connect_blocking(config: &KafkaConfig) -> ConsumerResult<Self> {
        info!(
            brokers = %config.bootstrap_servers(),
            group_id = %config.group_id,
            client_id = %config.client_id,
            topic = %config.topic,
            "Connecting to Kafka"
        );

        let consumer: StreamConsumer = client_config(config).create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        let metadata = consumer.fetch_metadata(
            Some(&config.topic),
            Duration::from_millis(config.metadata_timeout_ms),
        )?;

        for topic in metadata.topics() {
            if let Some(err) = topic.error() {
                return Err(KafkaError::MetadataFetch(err.into()).into());
            }
            debug!(
                topic = topic.name(),
                partitions = topic.partitions().len(),
                "Topic metadata fetched"
            );
        }

        info!(topic = %config.topic, group_id = %config.group_id, "Subscribed to Kafka topic");

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            group_id: config.group_id.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self) -> Option<ConsumerResult<ReceivedMessage>> {
        let result = self.consumer.recv().await.map(|message| {
            let metadata = message
                .headers()
                .map(MessageMetadata::from_kafka_headers)
                .unwrap_or_default();

            ReceivedMessage {
                payload: message.payload().map(<[u8]>::to_vec),
                metadata,
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            }
        });

        Some(result.map_err(Into::into))
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn describe(&self) -> String {
        format!("kafka topic '{}' (group '{}')", self.topic, self.group_id)
    }
}
