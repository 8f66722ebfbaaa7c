//! # tabsync-core: Pure Protocol Types for tabsync
//!
//! This crate holds the data model shared by every tabsync context: what
//! goes over the broadcast bus, what lands in storage, and how the two
//! storage areas are named. Nothing here touches storage or timers.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        tabsync Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Consumer (apps/demo)                         │   │
//! │  │         StoreReader::get ──► StoreWriter::set_val / reset       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tabsync (engine)                             │   │
//! │  │   store ─ election ─ transport ─ echo_guard ─ persistence       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tabsync-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  message  │  │  record   │  │  backend  │  │    id     │  │   │
//! │  │   │ WireMsg   │  │ Persisted │  │  Target   │  │ ContextId │  │   │
//! │  │   │ Frame     │  │ Record    │  │  keys     │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORAGE • NO TIMERS                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use tabsync_core::record::{extract_value, PersistedRecord};
//! use tabsync_core::message::WireMessage;
//!
//! let text = PersistedRecord::new(3_i64, true).to_json().unwrap();
//! let msg = WireMessage::State { num: text };
//!
//! let decoded = WireMessage::decode(&msg.encode()).unwrap();
//! if let WireMessage::State { num } = decoded {
//!     assert_eq!(extract_value::<i64>(&num).unwrap(), 3);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod error;
pub mod id;
pub mod message;
pub mod record;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use backend::BackendTarget;
pub use error::{CoreError, CoreResult};
pub use id::ContextId;
pub use message::{Frame, LeaderAction, LeaderMessage, WireMessage};
pub use record::{PersistedRecord, RecordState};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default prefix for per-channel record keys.
pub const DEFAULT_KEY_PREFIX: &str = "tabsync-";

/// Default key of the origin-global backend selector entry.
pub const DEFAULT_SELECTOR_KEY: &str = "tabsync-storage-backend";
