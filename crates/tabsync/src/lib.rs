//! # tabsync: Cross-Context State Synchronization
//!
//! Keeps small application state (counters, lists) consistent across every
//! context (tab) of an origin, with per-channel leader election, echo-free
//! broadcast, and recovery from the leader or from storage.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Context (one per tab)                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │            SynchronizedStore<V>  (one per channel)               │  │
//! │  │                                                                  │  │
//! │  │  get / set_val / reset / mutators      reader() / writer()       │  │
//! │  └───────┬───────────────────┬───────────────────────┬──────────────┘  │
//! │          ▼                   ▼                       ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Persistence    │  │   Transport    │  │  LeaderElection        │    │
//! │  │ Backend        │  │                │  │                        │    │
//! │  │ private/shared │  │ native, indexed│  │ apply / tell / death   │    │
//! │  │ areas, selector│  │ or shared-     │  │ heartbeats, failover   │    │
//! │  │ key migration  │  │ storage bus    │  │                        │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │                      ┌───────┴────────┐                                 │
//! │                      │   EchoGuard    │  coalesced "" acknowledgements  │
//! │                      └────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - Error types
//! - [`storage`] - Key/value storage areas
//! - [`persistence`] - Backend selection and record access
//! - [`transport`] - Per-channel broadcast endpoints
//! - [`echo_guard`] - Debounced echo-clear sender
//! - [`election`] - Leader election per channel
//! - [`channel`] - Role and join state machine
//! - [`store`] - The synchronized store and its driver
//! - [`context`] - Origins, contexts, open/close/reload
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabsync::{ChannelConfig, Context, Origin, SyncConfig};
//!
//! let origin = Origin::default();
//! let tab = Context::open(&origin, SyncConfig::load_or_default(None))?;
//!
//! let counter = tab.open_store(ChannelConfig::counter("counter")).await?;
//! counter.mutate("increment")?;
//! println!("count: {}", counter.get());
//!
//! tab.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod storage;

pub mod persistence;
pub mod transport;

pub mod channel;
pub mod echo_guard;
pub mod election;

pub mod context;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{ChannelEvent, Effect, ElectionState, Role};
pub use config::{ElectionSettings, StorageSettings, SyncConfig, TransportMode, TransportSettings};
pub use context::{Context, Origin};
pub use echo_guard::{EchoGuard, EchoGuardHandle};
pub use election::{ElectionConfig, ElectionHandle, ElectionService, JoinOutcome, LeaderState};
pub use error::{SyncError, SyncResult};
pub use persistence::PersistenceBackend;
pub use storage::{MemoryArea, StorageArea};
pub use store::{
    ChannelConfig, StoreReader, StoreStatus, StoreValue, StoreWriter, SynchronizedStore, Update,
};
pub use transport::{BroadcastBus, DeliveryMode, OriginCapabilities, Transport};

pub use tabsync_core::{BackendTarget, ContextId};
