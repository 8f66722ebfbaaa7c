//! # Bus Messages
//!
//! Everything a context puts on a channel's broadcast bus.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Channel Bus Messages                               │
//! │                                                                         │
//! │  DATA FRAMES (store protocol)                                          │
//! │  ────────────────────────────                                          │
//! │  FOLLOWER ───► "ask_leader_for_state"                                  │
//! │  LEADER   ───► { "num": "<serialized record>" }   (republish)          │
//! │  ANY      ───► { "num": "<serialized record>" }   (local mutation)     │
//! │  ANY      ───► ""                                 (echo clear)         │
//! │                                                                         │
//! │  LEADER FRAMES (election protocol)                                     │
//! │  ─────────────────────────────────                                     │
//! │  CANDIDATE ───► apply { token }                                        │
//! │  LEADER    ───► tell  { token }   (reply to apply + heartbeat)         │
//! │  LEADER    ───► death { token }   (context closing)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Frames are adjacently tagged so both protocols share one bus:
//! ```json
//! { "context": "leader", "msg": { "action": "apply", "token": "..." } }
//! { "context": "data",   "msg": { "num": "{\"state\":{...},\"version\":0}" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::id::ContextId;

/// Token a follower sends to ask the leader for its current value.
pub const ASK_LEADER_FOR_STATE: &str = "ask_leader_for_state";

/// The empty acknowledgement sent by the echo guard.
pub const ECHO_CLEAR: &str = "";

// =============================================================================
// Frame (what travels on the bus)
// =============================================================================

/// One unit on the bus: either election traffic or store data.
///
/// Data payloads stay as raw JSON so malformed traffic from a peer can be
/// carried to the store, which decides to drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "context", content = "msg", rename_all = "snake_case")]
pub enum Frame {
    /// Election protocol.
    Leader(LeaderMessage),
    /// Store protocol (see [`WireMessage`]).
    Data(Value),
}

impl Frame {
    /// Wraps a store message.
    pub fn data(msg: &WireMessage) -> Self {
        Frame::Data(msg.encode())
    }

    /// Wraps an election message.
    pub fn leader(action: LeaderAction, token: ContextId) -> Self {
        Frame::Leader(LeaderMessage { action, token })
    }

    /// Returns the frame kind as a string (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Leader(msg) => msg.action.as_str(),
            Frame::Data(_) => "data",
        }
    }

    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::SerializationFailed(e.to_string()))
    }
}

// =============================================================================
// Election Messages
// =============================================================================

/// Election actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderAction {
    /// A candidate asks whether anyone objects to it leading.
    Apply,
    /// The leader announces itself (reply to `Apply`, and heartbeat).
    Tell,
    /// The leader's context is terminating.
    Death,
}

impl LeaderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderAction::Apply => "apply",
            LeaderAction::Tell => "tell",
            LeaderAction::Death => "death",
        }
    }
}

/// An election message with its sender's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderMessage {
    pub action: LeaderAction,
    pub token: ContextId,
}

// =============================================================================
// Store Messages
// =============================================================================

/// The three shapes of store traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// `"ask_leader_for_state"`: only the leader acts on it.
    AskLeaderForState,
    /// `""`: processing acknowledgement, never carries data.
    EchoClear,
    /// `{ "num": <serialized record> }`.
    State { num: String },
}

impl WireMessage {
    /// Encodes into the JSON shape used on the bus.
    pub fn encode(&self) -> Value {
        match self {
            WireMessage::AskLeaderForState => Value::String(ASK_LEADER_FOR_STATE.to_string()),
            WireMessage::EchoClear => Value::String(ECHO_CLEAR.to_string()),
            WireMessage::State { num } => serde_json::json!({ "num": num }),
        }
    }

    /// Decodes a bus payload.
    ///
    /// Anything that is not one of the three shapes is an
    /// [`CoreError::InvalidMessage`].
    pub fn decode(value: &Value) -> CoreResult<Self> {
        match value {
            Value::String(s) if s == ASK_LEADER_FOR_STATE => Ok(WireMessage::AskLeaderForState),
            Value::String(s) if s.is_empty() => Ok(WireMessage::EchoClear),
            Value::String(other) => Err(CoreError::InvalidMessage(format!(
                "unknown token '{}'",
                other
            ))),
            Value::Object(map) => match map.get("num") {
                Some(Value::String(num)) => Ok(WireMessage::State { num: num.clone() }),
                Some(other) => Err(CoreError::InvalidMessage(format!(
                    "num must be a string, got {}",
                    other
                ))),
                None => Err(CoreError::InvalidMessage("object without num".into())),
            },
            other => Err(CoreError::InvalidMessage(format!("unexpected payload {}", other))),
        }
    }

    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::AskLeaderForState => "AskLeaderForState",
            WireMessage::EchoClear => "EchoClear",
            WireMessage::State { .. } => "State",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(WireMessage::AskLeaderForState.encode(), json!("ask_leader_for_state"));
        assert_eq!(WireMessage::EchoClear.encode(), json!(""));
        assert_eq!(
            WireMessage::State { num: "{}".into() }.encode(),
            json!({ "num": "{}" })
        );
    }

    #[test]
    fn test_decode_state() {
        let msg = WireMessage::decode(&json!({ "num": "payload" })).unwrap();
        assert_eq!(msg, WireMessage::State { num: "payload".into() });
    }

    #[test]
    fn test_decode_rejects_noise() {
        assert!(WireMessage::decode(&json!("hello")).is_err());
        assert!(WireMessage::decode(&json!({ "other": 1 })).is_err());
        assert!(WireMessage::decode(&json!({ "num": 5 })).is_err());
        assert!(WireMessage::decode(&json!(42)).is_err());
        assert!(WireMessage::decode(&Value::Null).is_err());
    }

    #[test]
    fn test_frame_tagging() {
        let token = ContextId::new();
        let frame = Frame::leader(LeaderAction::Tell, token);
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"context\":\"leader\""));
        assert!(json.contains("\"action\":\"tell\""));
        assert_eq!(frame.kind(), "tell");

        let data = Frame::data(&WireMessage::AskLeaderForState);
        assert!(data.to_json().unwrap().contains("\"context\":\"data\""));
    }
}
