//! Event envelope wire form and routing key derivation.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Event source recorded on every outgoing envelope.
const EVENT_SOURCE: &str = "/agent-gateway";

/// Reserved event-type prefix whose segments are stripped when deriving
/// a routing key.
const RESERVED_PREFIX: [&str; 2] = ["io", "agenteco"];

/// The JSON envelope published to (and expected back from) the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub specversion: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub time: String,
    pub datacontenttype: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl EventEnvelope {
    /// Build an outgoing envelope wrapping `data` with a fresh event id
    /// and the current timestamp.
    pub fn new(event_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            specversion: "1.0".to_string(),
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: EVENT_SOURCE.to_string(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            datacontenttype: "application/json".to_string(),
            data,
        }
    }
}

/// The decoded reply event: its `type` and `data` fields.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Derive the broker routing key from an event type.
///
/// `io.agenteco.auth.login.requested.v1` becomes `auth.login.requested`:
/// the two-segment reserved prefix and the trailing version segment are
/// stripped. Types without the prefix, or with fewer than five segments,
/// pass through verbatim.
pub fn derive_routing_key(event_type: &str) -> String {
    let parts: Vec<&str> = event_type.split('.').collect();
    if parts.len() < 5 || parts[0] != RESERVED_PREFIX[0] || parts[1] != RESERVED_PREFIX[1] {
        return event_type.to_string();
    }
    parts[2..parts.len() - 1].join(".")
}
