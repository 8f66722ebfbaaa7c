//! # Sync Error Types
//!
//! Error types for the synchronization engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Environment   │  │     Protocol (noise)    │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidBackend │  │  Storage        │  │  InvalidMessage         │ │
//! │  │  InvalidConfig  │  │  Unavailable    │  │  DeserializationFailed  │ │
//! │  │  DuplicateChan. │  │                 │  │                         │ │
//! │  │  UnknownMutator │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Configuration errors are raised synchronously to the caller.          │
//! │  Environment errors are fatal at initialization and never retried.     │
//! │  Protocol noise is dropped by the store driver and only logged.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use tabsync_core::CoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Backend selection named an unknown storage area.
    #[error("Invalid backend target: '{0}'. Valid options: sessionStorage, localStorage")]
    InvalidBackendTarget(String),

    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Two channels with the same name were opened in one context.
    #[error("Channel '{0}' is already open in this context")]
    DuplicateChannel(String),

    /// A mutator name that the channel does not define.
    #[error("Channel '{channel}' has no mutator named '{name}'")]
    UnknownMutator { channel: String, name: String },

    // =========================================================================
    // Environment Errors
    // =========================================================================
    /// A storage area refused access.
    #[error("Storage unavailable: {area} ({reason})")]
    StorageUnavailable { area: String, reason: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Invalid message received.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize a record.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a record or payload.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The context is closing.
    #[error("Context is shutting down")]
    ShuttingDown,

    /// Task channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidBackendTarget(target) => SyncError::InvalidBackendTarget(target),
            CoreError::InvalidMessage(msg) => SyncError::InvalidMessage(msg),
            missing @ CoreError::MissingValue => SyncError::DeserializationFailed(missing.to_string()),
            CoreError::SerializationFailed(msg) => SyncError::SerializationFailed(msg),
            CoreError::DeserializationFailed(msg) => SyncError::DeserializationFailed(msg),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error indicates a caller or configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidBackendTarget(_)
                | SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::DuplicateChannel(_)
                | SyncError::UnknownMutator { .. }
        )
    }

    /// Returns true if the host environment refused a capability.
    pub fn is_environment_error(&self) -> bool {
        matches!(self, SyncError::StorageUnavailable { .. })
    }

    /// Returns true for errors the store driver drops instead of surfacing.
    pub fn is_protocol_noise(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidMessage(_) | SyncError::DeserializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidBackendTarget("indexedDB".into()).is_config_error());
        assert!(SyncError::DuplicateChannel("counter".into()).is_config_error());
        assert!(SyncError::UnknownMutator {
            channel: "counter".into(),
            name: "triple".into()
        }
        .is_config_error());

        let unavailable = SyncError::StorageUnavailable {
            area: "localStorage".into(),
            reason: "disabled".into(),
        };
        assert!(unavailable.is_environment_error());
        assert!(!unavailable.is_config_error());

        assert!(SyncError::InvalidMessage("x".into()).is_protocol_noise());
        assert!(!SyncError::ShuttingDown.is_protocol_noise());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: SyncError = CoreError::InvalidBackendTarget("cookies".into()).into();
        assert!(matches!(err, SyncError::InvalidBackendTarget(ref t) if t == "cookies"));

        let err: SyncError = CoreError::MissingValue.into();
        assert!(err.is_protocol_noise());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::UnknownMutator {
            channel: "phrases".into(),
            name: "shuffle".into(),
        };
        assert!(err.to_string().contains("phrases"));
        assert!(err.to_string().contains("shuffle"));
    }
}
