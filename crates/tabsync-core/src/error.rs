//! # Error Types
//!
//! Protocol-level error types for tabsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tabsync-core errors (this file)                                       │
//! │  └── CoreError        - Codec and parsing failures                     │
//! │                                                                         │
//! │  tabsync errors (engine crate)                                         │
//! │  └── SyncError        - Storage, config, channel failures              │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → caller (config/environment only)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Codec and parsing errors.
///
/// Apart from [`CoreError::InvalidBackendTarget`], these describe protocol
/// noise: the engine drops the offending message instead of surfacing them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backend selector token names no known storage area.
    #[error("Invalid backend target: '{0}'. Valid options: sessionStorage, localStorage")]
    InvalidBackendTarget(String),

    /// A bus payload matches none of the three wire shapes.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A persisted record parsed but carries no `state.val`.
    #[error("Record has no state.val field")]
    MissingValue,

    /// Text could not be encoded.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Text could not be decoded.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl CoreError {
    /// Returns true for errors the engine treats as droppable noise.
    pub fn is_protocol_noise(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidMessage(_)
                | CoreError::MissingValue
                | CoreError::DeserializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_classification() {
        assert!(CoreError::MissingValue.is_protocol_noise());
        assert!(CoreError::InvalidMessage("x".into()).is_protocol_noise());
        assert!(!CoreError::InvalidBackendTarget("indexedDB".into()).is_protocol_noise());
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidBackendTarget("cookies".into());
        assert!(err.to_string().contains("cookies"));
    }
}
