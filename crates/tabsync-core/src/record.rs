//! # Persisted Record
//!
//! The text stored under a channel's key, and also the payload of every
//! `{ num }` broadcast.
//!
//! ```json
//! { "state": { "val": <V>, "doPost": true }, "version": 0 }
//! ```
//!
//! `doPost` records whether the write originated locally. The write path
//! reads it back to decide whether to broadcast, so a value received from
//! the network is persisted but never rebroadcast.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Current record layout version.
pub const RECORD_VERSION: u32 = 0;

/// The `state` part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordState<V> {
    /// The synchronized payload.
    pub val: V,
    /// True when the mutation originated in this context.
    pub do_post: bool,
}

/// A full persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord<V> {
    pub state: RecordState<V>,
    #[serde(default)]
    pub version: u32,
}

impl<V> PersistedRecord<V> {
    pub fn new(val: V, do_post: bool) -> Self {
        PersistedRecord {
            state: RecordState { val, do_post },
            version: RECORD_VERSION,
        }
    }
}

impl<V: Serialize> PersistedRecord<V> {
    /// Serializes to the stored/broadcast text.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::SerializationFailed(e.to_string()))
    }
}

impl<V: DeserializeOwned> PersistedRecord<V> {
    /// Parses a full record.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::DeserializationFailed(e.to_string()))
    }
}

/// Extracts `state.val` from a serialized record.
///
/// Other fields are ignored, so records written by peers with extra
/// metadata still apply. A record without `state.val` is
/// [`CoreError::MissingValue`]; a JSON `null` is a present value.
pub fn extract_value<V: DeserializeOwned>(text: &str) -> CoreResult<V> {
    let parsed: Value =
        serde_json::from_str(text).map_err(|e| CoreError::DeserializationFailed(e.to_string()))?;
    let val = parsed
        .pointer("/state/val")
        .cloned()
        .ok_or(CoreError::MissingValue)?;
    serde_json::from_value(val).map_err(|e| CoreError::DeserializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let json = PersistedRecord::new(vec!["X", "Y"], true).to_json().unwrap();
        assert_eq!(json, r#"{"state":{"val":["X","Y"],"doPost":true},"version":0}"#);
    }

    #[test]
    fn test_extract_ignores_extra_fields() {
        let text = r#"{"state":{"val":7,"doPost":false,"extra":1},"version":3,"meta":"x"}"#;
        assert_eq!(extract_value::<i64>(text).unwrap(), 7);
    }

    #[test]
    fn test_extract_missing_value() {
        let err = extract_value::<i64>(r#"{"state":{"doPost":true}}"#).unwrap_err();
        assert!(matches!(err, CoreError::MissingValue));
    }

    #[test]
    fn test_extract_falsy_values_are_present() {
        assert_eq!(extract_value::<i64>(r#"{"state":{"val":0}}"#).unwrap(), 0);
        assert_eq!(
            extract_value::<Vec<String>>(r#"{"state":{"val":[]}}"#).unwrap(),
            Vec::<String>::new()
        );
        assert_eq!(extract_value::<Option<i64>>(r#"{"state":{"val":null}}"#).unwrap(), None);
    }

    #[test]
    fn test_extract_rejects_garbage_and_wrong_type() {
        assert!(extract_value::<i64>("not json").is_err());
        assert!(extract_value::<i64>("").is_err());
        assert!(extract_value::<i64>(r#"{"state":{"val":"three"}}"#).is_err());
    }

    #[test]
    fn test_full_record_parse() {
        let record: PersistedRecord<i64> =
            PersistedRecord::from_json(r#"{"state":{"val":2,"doPost":false}}"#).unwrap();
        assert_eq!(record.state.val, 2);
        assert!(!record.state.do_post);
        assert_eq!(record.version, 0);
    }
}
