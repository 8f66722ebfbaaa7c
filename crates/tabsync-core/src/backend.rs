//! # Backend Targets
//!
//! Names of the two storage areas and the keys derived for them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storage Areas                                    │
//! │                                                                         │
//! │  PRIVATE ("sessionStorage", default)  │  SHARED ("localStorage")        │
//! │  ─────────────────────────────────    │  ──────────────────────────     │
//! │  • One per context                    │  • One per origin               │
//! │  • Survives reload, not close         │  • Visible to every context     │
//! │                                       │  • Always holds the selector    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which storage area is authoritative for channel records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendTarget {
    /// Per-context area, cleared when the context closes.
    #[default]
    #[serde(rename = "sessionStorage")]
    Private,
    /// Origin-wide area, shared by all contexts.
    #[serde(rename = "localStorage")]
    Shared,
}

impl BackendTarget {
    /// The token persisted under the selector key.
    pub fn token(&self) -> &'static str {
        match self {
            BackendTarget::Private => "sessionStorage",
            BackendTarget::Shared => "localStorage",
        }
    }

    /// Parses a persisted selector token.
    ///
    /// Unlike [`str::parse`], an unrecognized token is not an error here:
    /// it yields `None` so the caller can warn and fall back to the default.
    pub fn from_token(token: &str) -> Option<Self> {
        token.parse().ok()
    }
}

impl std::fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl std::str::FromStr for BackendTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sessionstorage" | "session" | "private" => Ok(BackendTarget::Private),
            "localstorage" | "local" | "shared" => Ok(BackendTarget::Shared),
            _ => Err(CoreError::InvalidBackendTarget(s.to_string())),
        }
    }
}

/// Storage key of a channel's record.
pub fn record_key(prefix: &str, channel: &str) -> String {
    format!("{}{}", prefix, channel)
}

/// Storage key a shared-storage bus mirrors its last message into.
pub fn channel_mirror_key(prefix: &str, channel: &str) -> String {
    format!("{}channel-{}", prefix, channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!("sessionStorage".parse::<BackendTarget>().unwrap(), BackendTarget::Private);
        assert_eq!("localStorage".parse::<BackendTarget>().unwrap(), BackendTarget::Shared);
        assert_eq!("shared".parse::<BackendTarget>().unwrap(), BackendTarget::Shared);
        assert!("indexedDB".parse::<BackendTarget>().is_err());
        assert!(BackendTarget::from_token("cookies").is_none());
    }

    #[test]
    fn test_token_round_trip() {
        for target in [BackendTarget::Private, BackendTarget::Shared] {
            assert_eq!(BackendTarget::from_token(target.token()), Some(target));
        }
        assert_eq!(BackendTarget::default(), BackendTarget::Private);
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(record_key("tabsync-", "counter"), "tabsync-counter");
        assert_eq!(channel_mirror_key("tabsync-", "counter"), "tabsync-channel-counter");
    }
}
