//! Backend messages: JSON objects keyed by `"function"`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::identity::NodeId;

/// Requests from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Allow a node that sent `include_req` to join.
    IncludeGrant {
        #[serde(deserialize_with = "node_id")]
        node: NodeId,
    },
    /// Replace the pending configuration of a node. Keys are directive names, in order.
    Config {
        #[serde(deserialize_with = "node_id")]
        node: NodeId,
        config: Map<String, Value>,
    },
}

impl ClientMessage {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// The backend sends node IDs either as numbers or as numeric strings.
fn node_id<'de, D: Deserializer<'de>>(d: D) -> Result<NodeId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }
    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(NodeId(n)),
        Raw::Text(s) => s
            .trim()
            .parse::<u32>()
            .map(NodeId)
            .map_err(serde::de::Error::custom),
    }
}

/// Notifications to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum Notification {
    IncludeReq {
        include_req: NodeId,
    },
    Alert {
        #[serde(rename = "type")]
        alert_type: u16,
        signal: u8,
        source: NodeId,
    },
    Battery {
        value: f64,
        signal: u8,
        source: NodeId,
    },
    WokenUp {
        signal: u8,
        source: NodeId,
    },
}

impl Notification {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Periodic liveness message.
pub fn keepalive() -> Value {
    json!({ "status": "init" })
}
