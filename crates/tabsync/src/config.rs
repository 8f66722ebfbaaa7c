//! # Sync Configuration
//!
//! Configuration management for the synchronization engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TABSYNC_TRANSPORT_MODE=native                                      │
//! │     TABSYNC_DEFAULT_BACKEND=localStorage                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tabsync/tabsync.toml (Linux)                             │
//! │     ~/Library/Application Support/dev.tabsync.tabsync/tabsync.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     TransportMode::Auto, 1000ms windows, sessionStorage                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tabsync.toml
//! [transport]
//! mode = "auto"            # auto | native | indexed | shared_storage
//! secure = true
//! echo_clear_window_ms = 1000
//! indexed_fallback = true
//!
//! [election]
//! timeout_ms = 1000
//! heartbeat_interval_ms = 1000
//! heartbeat_timeout_ms = 3000
//!
//! [storage]
//! key_prefix = "tabsync-"
//! selector_key = "tabsync-storage-backend"
//! default_backend = "sessionStorage"
//! ```
//!
//! Channel settings (name, initial value, mutators) are not part of this
//! file; they are supplied in code through `ChannelConfig`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tabsync_core::{BackendTarget, DEFAULT_KEY_PREFIX, DEFAULT_SELECTOR_KEY};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Transport Mode
// =============================================================================

/// How a channel's bus should be realised.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                      Transport Mode Behavior                            │
/// │                                                                         │
/// │  AUTO (Default)                                                        │
/// │  ──────────────                                                        │
/// │  • Native broadcast when the origin offers it                          │
/// │  • Otherwise indexed storage, otherwise shared storage                 │
/// │                                                                         │
/// │  NATIVE                                                                │
/// │  ──────                                                                │
/// │  • Echo-free by construction, no echo-clear acknowledgements           │
/// │                                                                         │
/// │  INDEXED                                                               │
/// │  ───────                                                               │
/// │  • Falls back to shared storage when indexed_fallback is on            │
/// │                                                                         │
/// │  SHARED_STORAGE                                                        │
/// │  ──────────────                                                        │
/// │  • Every message mirrored into the shared area                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Auto,
    Native,
    Indexed,
    SharedStorage,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Auto => write!(f, "auto"),
            TransportMode::Native => write!(f, "native"),
            TransportMode::Indexed => write!(f, "indexed"),
            TransportMode::SharedStorage => write!(f, "shared_storage"),
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TransportMode::Auto),
            "native" | "broadcast" => Ok(TransportMode::Native),
            "indexed" | "idb" => Ok(TransportMode::Indexed),
            "shared_storage" | "localstorage" | "storage" => Ok(TransportMode::SharedStorage),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown transport mode: '{}'. Valid options: auto, native, indexed, shared_storage",
                other
            ))),
        }
    }
}

// =============================================================================
// Transport Settings
// =============================================================================

/// Bus and echo-guard behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default)]
    pub mode: TransportMode,

    /// When false, the echo guard is disabled entirely.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Coalesce window of the echo-clear acknowledgement (milliseconds).
    #[serde(default = "default_echo_clear_window")]
    pub echo_clear_window_ms: u64,

    /// Replace an indexed bus with a shared-storage bus.
    #[serde(default = "default_true")]
    pub indexed_fallback: bool,
}

fn default_true() -> bool {
    true
}

fn default_echo_clear_window() -> u64 {
    1000
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            mode: TransportMode::default(),
            secure: true,
            echo_clear_window_ms: default_echo_clear_window(),
            indexed_fallback: true,
        }
    }
}

// =============================================================================
// Election Settings
// =============================================================================

/// Timing of the per-channel leader election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSettings {
    /// How long a candidate waits for objections (milliseconds).
    #[serde(default = "default_election_timeout")]
    pub timeout_ms: u64,

    /// How often the leader announces itself (milliseconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which followers campaign again (milliseconds).
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,
}

fn default_election_timeout() -> u64 {
    1000
}

fn default_heartbeat_interval() -> u64 {
    1000
}

fn default_heartbeat_timeout() -> u64 {
    3000
}

impl Default for ElectionSettings {
    fn default() -> Self {
        ElectionSettings {
            timeout_ms: default_election_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl ElectionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Storage key layout and the default backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Prefix of every channel record key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Key of the origin-global backend selector in the shared area.
    #[serde(default = "default_selector_key")]
    pub selector_key: String,

    /// Area used when no selector has been persisted yet.
    #[serde(default)]
    pub default_backend: BackendTarget,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_selector_key() -> String {
    DEFAULT_SELECTOR_KEY.to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            key_prefix: default_key_prefix(),
            selector_key: default_selector_key(),
            default_backend: BackendTarget::default(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub election: ElectionSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tabsync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading tabsync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load tabsync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "tabsync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.election.timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "election.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.election.heartbeat_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "election.heartbeat_interval_ms must be greater than 0".into(),
            ));
        }

        // A follower must see at least one heartbeat before giving up on the leader
        if self.election.heartbeat_timeout_ms <= self.election.heartbeat_interval_ms {
            return Err(SyncError::InvalidConfig(format!(
                "election.heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.election.heartbeat_timeout_ms, self.election.heartbeat_interval_ms
            )));
        }

        if self.storage.selector_key.is_empty() {
            return Err(SyncError::InvalidConfig(
                "storage.selector_key must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("TABSYNC_TRANSPORT_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding transport mode from environment");
                    self.transport.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown transport mode in environment"),
            }
        }

        if let Ok(secure) = std::env::var("TABSYNC_SECURE") {
            match secure.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.transport.secure = true,
                "0" | "false" | "no" => self.transport.secure = false,
                _ => warn!(secure = %secure, "Unknown TABSYNC_SECURE value in environment"),
            }
        }

        if let Ok(window) = std::env::var("TABSYNC_ECHO_WINDOW_MS") {
            if let Ok(ms) = window.parse::<u64>() {
                self.transport.echo_clear_window_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("TABSYNC_ELECTION_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                debug!(timeout_ms = ms, "Overriding election timeout from environment");
                self.election.timeout_ms = ms;
            }
        }

        if let Ok(backend) = std::env::var("TABSYNC_DEFAULT_BACKEND") {
            match backend.parse() {
                Ok(parsed) => self.storage.default_backend = parsed,
                Err(_) => warn!(backend = %backend, "Unknown default backend in environment"),
            }
        }

        if let Ok(prefix) = std::env::var("TABSYNC_KEY_PREFIX") {
            self.storage.key_prefix = prefix;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tabsync", "tabsync")
            .map(|dirs| dirs.config_dir().join("tabsync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the echo-clear coalesce window.
    pub fn echo_clear_window(&self) -> Duration {
        Duration::from_millis(self.transport.echo_clear_window_ms)
    }

    /// Returns the storage key of a channel record.
    pub fn record_key(&self, channel: &str) -> String {
        tabsync_core::backend::record_key(&self.storage.key_prefix, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mode_parsing() {
        assert_eq!("auto".parse::<TransportMode>().unwrap(), TransportMode::Auto);
        assert_eq!("native".parse::<TransportMode>().unwrap(), TransportMode::Native);
        assert_eq!("idb".parse::<TransportMode>().unwrap(), TransportMode::Indexed);
        assert_eq!(
            "localstorage".parse::<TransportMode>().unwrap(),
            TransportMode::SharedStorage
        );
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.transport.mode, TransportMode::Auto);
        assert!(config.transport.secure);
        assert_eq!(config.transport.echo_clear_window_ms, 1000);
        assert_eq!(config.election.timeout_ms, 1000);
        assert_eq!(config.storage.default_backend, BackendTarget::Private);
        assert_eq!(config.record_key("counter"), "tabsync-counter");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.election.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.election.timeout_ms = 1000;
        config.election.heartbeat_timeout_ms = 500;
        assert!(config.validate().is_err());

        config.election.heartbeat_timeout_ms = 3000;
        config.storage.selector_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [transport]
            mode = "shared_storage"

            [storage]
            default_backend = "localStorage"
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.mode, TransportMode::SharedStorage);
        assert!(config.transport.indexed_fallback);
        assert_eq!(config.storage.default_backend, BackendTarget::Shared);
        assert_eq!(config.election.heartbeat_timeout_ms, 3000);
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[transport]"));
        assert!(toml_str.contains("[election]"));
        assert!(toml_str.contains("sessionStorage"));
    }
}
