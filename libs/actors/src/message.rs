//! Actor messages and mailbox envelopes
//!
//! Senders hand the system an [`ActorMessage`] (`{type, data}`); the system
//! wraps it in an [`Envelope`], the mailbox form of an atom with group
//! `actor` and element set to the message type.

use crate::id::ActorId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::DEFAULT_PRIORITY;

/// Group carried by every mailbox atom
pub const ACTOR_GROUP: &str = "actor";

/// Message type of the synthetic message replayed on start and restart
pub const INIT: &str = "init";

/// Message type a failing actor sends to its supervisor
pub const CHILD_ERROR: &str = "child_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl ActorMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub element: String,
    pub data: Value,
    pub sender: Option<ActorId>,
    pub priority: u8,
    /// Enqueue time, unix milliseconds
    pub timestamp: u64,
}

impl Envelope {
    pub fn new(id: impl Into<String>, message: ActorMessage, sender: Option<ActorId>) -> Self {
        Self {
            id: id.into(),
            element: message.kind,
            data: message.data,
            sender,
            priority: DEFAULT_PRIORITY,
            timestamp: types::current_timestamp_ms(),
        }
    }

    pub fn group(&self) -> &'static str {
        ACTOR_GROUP
    }
}

/// Payload of a `child_error` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildError {
    pub child: ActorId,
    pub actor_type: String,
    pub error: String,
    pub restart_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg: ActorMessage =
            serde_json::from_value(json!({"type": "increment", "data": {"by": 2}})).unwrap();
        assert_eq!(msg.kind, "increment");

        let env = Envelope::new("m1", msg, None);
        assert_eq!(env.group(), "actor");
        assert_eq!(env.element, "increment");
        assert_eq!(env.data["by"], 2);
    }

    #[test]
    fn test_child_error_round_trips_through_json() {
        let report = ChildError {
            child: ActorId::new(),
            actor_type: "worker".into(),
            error: "boom".into(),
            restart_count: 2,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["child"].as_str().unwrap().starts_with("actor-"));
        assert_eq!(serde_json::from_value::<ChildError>(value).unwrap(), report);
    }
}
