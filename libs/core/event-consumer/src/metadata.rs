//! Message metadata (broker headers)
//!
//! Header names are case-insensitive: keys are stored lower-cased and every
//! lookup is lower-cased before matching.

use opentelemetry::propagation::Extractor;
use rdkafka::message::Headers;
use std::collections::HashMap;

/// Header map carried alongside an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    headers: HashMap<String, String>,
}

impl MessageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from Kafka record headers. Headers without a value, or whose
    /// value is not UTF-8, are skipped.
    pub fn from_kafka_headers<H: Headers>(headers: &H) -> Self {
        let mut metadata = Self::new();
        for header in headers.iter() {
            let Some(value) = header.value else {
                continue;
            };
            if let Ok(value) = std::str::from_utf8(value) {
                metadata.insert(header.key, value);
            }
        }
        metadata
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl Extractor for MessageMetadata {
    fn get(&self, key: &str) -> Option<&str> {
        MessageMetadata::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(String::as_str).collect()
    }
}
