//! Envelope record type and serialization

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Constant source tag carried by every envelope
pub const ENVELOPE_SOURCE: &str = "binance-websocket";

/// Envelope schema version
pub const ENVELOPE_VERSION: &str = "1.0";

/// Optional collaborator that attaches trace propagation headers to an
/// envelope. Absence is normal and omits the field entirely.
pub trait TraceInjector: Send + Sync {
    fn inject(&self) -> Option<BTreeMap<String, String>>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope stream name must not be empty")]
    EmptyStream,
}

/// The canonical record published to the bus for each upstream frame.
///
/// Serialization is deterministic: equal inputs and equal clock readings
/// produce identical bytes.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub stream: String,
    /// The parsed upstream payload, passed through opaquely.
    pub data: Value,
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Utc>,
    pub message_id: Uuid,
    pub source: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<BTreeMap<String, String>>,
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Envelope {
    /// Build an envelope with a fresh message id.
    pub fn new(
        stream: String,
        data: Value,
        timestamp: DateTime<Utc>,
        trace_context: Option<BTreeMap<String, String>>,
    ) -> Result<Self, EnvelopeError> {
        if stream.is_empty() {
            return Err(EnvelopeError::EmptyStream);
        }
        Ok(Self {
            stream,
            data,
            timestamp,
            message_id: Uuid::new_v4(),
            source: ENVELOPE_SOURCE,
            version: ENVELOPE_VERSION,
            trace_context,
        })
    }

    /// Serialize to the UTF-8 JSON wire form.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
