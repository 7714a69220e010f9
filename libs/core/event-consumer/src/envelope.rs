//! Event envelope
//!
//! Wire format: `{ "type": "<string>", "payload": { ... } }`. The type is the
//! dispatch key; the payload is opaque until a handler claims it.

use crate::error::{ConsumerError, ConsumerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work pulled from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Dispatch key (non-empty)
    #[serde(rename = "type")]
    pub event_type: String,

    /// Handler-specific data, `null` when absent
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    /// Create a new envelope
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Parse an envelope from raw message bytes.
    ///
    /// Fails on invalid JSON, a missing `type`, or an empty `type`.
    pub fn parse(bytes: &[u8]) -> ConsumerResult<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| ConsumerError::MalformedEnvelope(e.to_string()))?;

        if envelope.event_type.trim().is_empty() {
            return Err(ConsumerError::MalformedEnvelope(
                "envelope type is empty".to_string(),
            ));
        }

        Ok(envelope)
    }

    /// Deserialize the payload into the handler's expected shape.
    pub fn payload_as<T: DeserializeOwned>(&self) -> ConsumerResult<T> {
        T::deserialize(&self.payload).map_err(|e| ConsumerError::InvalidPayload {
            event_type: self.event_type.clone(),
            details: e.to_string(),
        })
    }

    /// Serialize back to wire bytes.
    pub fn to_bytes(&self) -> ConsumerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ConsumerError::MalformedEnvelope(e.to_string()))
    }
}
