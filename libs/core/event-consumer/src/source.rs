//! Message sources feeding the worker loop.
//!
//! `MessageSource` hides the broker behind one `recv` call. The Kafka
//! implementation lives in `kafka.rs`; `InMemorySource` replays a fixed
//! list of messages and is what the tests drive the loop with.

use crate::envelope::EventEnvelope;
use crate::error::ConsumerResult;
use crate::metadata::MessageMetadata;
use async_trait::async_trait;
use std::collections::VecDeque;

/// A message as received from the broker, detached from the client's buffers.
#[derive(Debug, Clone, Default)]
pub struct ReceivedMessage {
    /// Raw value bytes (`None` for tombstones)
    pub payload: Option<Vec<u8>>,
    pub metadata: MessageMetadata,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl ReceivedMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Some(payload.into()),
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Build a message carrying a serialized envelope.
    pub fn from_envelope(topic: impl Into<String>, envelope: &EventEnvelope) -> ConsumerResult<Self> {
        Ok(Self::new(topic, envelope.to_bytes()?))
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }
}

/// Source of broker messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// `None` means the source is exhausted and the worker should stop.
    /// `Some(Err(_))` is a receive error; the worker backs off and retries.
    async fn recv(&mut self) -> Option<ConsumerResult<ReceivedMessage>>;

    /// Topic the source reads from.
    fn topic(&self) -> &str;

    /// Human-readable description for logs (topic, group, ...)
    fn describe(&self) -> String;
}

/// Fixed, in-process message source.
#[derive(Debug, Default)]
pub struct InMemorySource {
    topic: String,
    messages: VecDeque<ConsumerResult<ReceivedMessage>>,
}

impl InMemorySource {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            messages: VecDeque::new(),
        }
    }

    /// Queue a message. Partition 0, offsets assigned in push order.
    pub fn push(&mut self, mut message: ReceivedMessage) {
        if message.topic.is_empty() {
            message.topic = self.topic.clone();
        }
        message.offset = self.messages.len() as i64;
        self.messages.push_back(Ok(message));
    }

    /// Queue raw bytes with no headers.
    pub fn push_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        let message = ReceivedMessage::new(self.topic.clone(), bytes);
        self.push(message);
    }

    /// Queue a receive error.
    pub fn push_error(&mut self, error: crate::error::ConsumerError) {
        self.messages.push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn recv(&mut self) -> Option<ConsumerResult<ReceivedMessage>> {
        self.messages.pop_front()
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn describe(&self) -> String {
        format!("in-memory topic '{}'", self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_source_replays_in_order() {
        let mut source = InMemorySource::new("notifications");
        source.push_bytes(b"first".to_vec());
        source.push(ReceivedMessage::from_envelope("", &EventEnvelope::new("welcome", json!({}))).unwrap());

        let first = source.recv().await.unwrap().unwrap();
        assert_eq!(first.payload.as_deref(), Some(&b"first"[..]));
        assert_eq!(first.offset, 0);
        assert_eq!(first.topic, "notifications");

        let second = source.recv().await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(EventEnvelope::parse(second.payload.as_deref().unwrap()).unwrap().event_type, "welcome");

        assert!(source.recv().await.is_none());
        assert_eq!(source.remaining(), 0);
    }
}
