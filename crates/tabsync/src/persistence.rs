//! # Persistence Backend
//!
//! Reads and writes channel records in whichever storage area the backend
//! selector currently names, and migrates records when the selector moves.
//!
//! ## Backend Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     select_backend("localStorage")                      │
//! │                                                                         │
//! │  1. Parse target            unknown ──► InvalidBackendTarget (no-op)   │
//! │  2. Same as active?         yes ──────► no-op                          │
//! │  3. For each registered key:                                           │
//! │        text = old.get(key)                                             │
//! │        if present: new.set(key, text)                                  │
//! │  4. shared.set(selector_key, "localStorage")                           │
//! │     any failure up to here ──► undo copies, old area stays intact      │
//! │  5. active = Shared, then old.remove(key) for each key                 │
//! │  6. reload_after? ──► bump reload signal, every channel rejoins        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The selector lives in the shared area so every context of the origin
//! reads the same token. A missing record triggers one lazy re-read of the
//! selector, in case another context moved the records meanwhile.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tabsync_core::BackendTarget;

use crate::config::StorageSettings;
use crate::error::{SyncError, SyncResult};
use crate::storage::{check_writable, StorageArea};

/// Storage access for every channel of one context.
pub struct PersistenceBackend {
    private: Arc<dyn StorageArea>,
    shared: Arc<dyn StorageArea>,
    settings: StorageSettings,
    active: RwLock<BackendTarget>,
    /// Record keys of the channels opened in this context.
    keys: RwLock<BTreeSet<String>>,
    /// Bumped whenever channels must re-hydrate and rejoin.
    reload_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for PersistenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBackend")
            .field("private", &self.private.name())
            .field("shared", &self.shared.name())
            .field("active", &self.active())
            .finish()
    }
}

impl PersistenceBackend {
    /// Opens the backend, resolving the selector and probing both areas.
    ///
    /// A refused write check is [`SyncError::StorageUnavailable`]; callers treat it
    /// as fatal and do not retry.
    pub fn open(
        private: Arc<dyn StorageArea>,
        shared: Arc<dyn StorageArea>,
        settings: StorageSettings,
    ) -> SyncResult<Self> {
        check_writable(shared.as_ref())?;

        let (reload_tx, _) = watch::channel(0);
        let backend = PersistenceBackend {
            private,
            shared,
            settings,
            active: RwLock::new(BackendTarget::default()),
            keys: RwLock::new(BTreeSet::new()),
            reload_tx,
        };

        let active = backend.resolve_selector()?;
        check_writable(backend.area(active).as_ref())?;
        backend.set_active(active);

        info!(backend = %active, "Persistence backend opened");
        Ok(backend)
    }

    /// Returns the area currently holding channel records.
    pub fn active(&self) -> BackendTarget {
        match self.active.read() {
            Ok(active) => *active,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_active(&self, target: BackendTarget) {
        match self.active.write() {
            Ok(mut active) => *active = target,
            Err(poisoned) => *poisoned.into_inner() = target,
        }
    }

    fn area(&self, target: BackendTarget) -> &Arc<dyn StorageArea> {
        match target {
            BackendTarget::Private => &self.private,
            BackendTarget::Shared => &self.shared,
        }
    }

    /// Reads the selector token from the shared area.
    fn resolve_selector(&self) -> SyncResult<BackendTarget> {
        let token = self.shared.get_item(&self.settings.selector_key)?;
        Ok(match token {
            None => self.settings.default_backend,
            Some(token) => BackendTarget::from_token(&token).unwrap_or_else(|| {
                warn!(
                    token = %token,
                    default = %self.settings.default_backend,
                    "Unrecognized backend selector, using default area"
                );
                self.settings.default_backend
            }),
        })
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    /// Reads a record; `None` means the key has no entry.
    pub fn read(&self, key: &str) -> SyncResult<Option<String>> {
        let active = self.active();
        if let Some(text) = self.area(active).get_item(key)? {
            return Ok(Some(text));
        }

        let resolved = self.resolve_selector()?;
        if resolved != active {
            debug!(from = %active, to = %resolved, key, "Backend selector moved, retrying read");
            self.set_active(resolved);
        }
        self.area(resolved).get_item(key)
    }

    pub fn write(&self, key: &str, text: &str) -> SyncResult<()> {
        self.area(self.active()).set_item(key, text)
    }

    pub fn remove(&self, key: &str) -> SyncResult<()> {
        self.area(self.active()).remove_item(key)
    }

    // =========================================================================
    // Channel Registration
    // =========================================================================

    /// Registers a channel's record key for migration.
    ///
    /// Each channel name may be opened once per context.
    pub fn register(&self, channel: &str, key: &str) -> SyncResult<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| SyncError::ChannelError("key registry poisoned".into()))?;
        if !keys.insert(key.to_string()) {
            return Err(SyncError::DuplicateChannel(channel.to_string()));
        }
        Ok(())
    }

    pub fn registered_keys(&self) -> Vec<String> {
        match self.keys.read() {
            Ok(keys) => keys.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    // =========================================================================
    // Backend Selection
    // =========================================================================

    /// Moves every registered record to `target` and persists the selector.
    ///
    /// Selecting the active area again does nothing. With `reload_after`,
    /// every channel of the context re-hydrates from the new area and
    /// rejoins its election.
    pub fn select_backend(&self, target: &str, reload_after: bool) -> SyncResult<()> {
        let target: BackendTarget = target.parse()?;
        let current = self.active();

        if target == current {
            debug!(backend = %target, "Backend already active");
            return Ok(());
        }

        let old = self.area(current);
        let new = self.area(target);
        let keys = self.registered_keys();

        // Copy first: until the selector moves, the old area stays authoritative
        let mut copied: Vec<(&String, Option<String>)> = Vec::new();
        let staged = keys.iter().try_for_each(|key| {
            if let Some(text) = old.get_item(key)? {
                let previous = new.get_item(key)?;
                new.set_item(key, &text)?;
                copied.push((key, previous));
            }
            Ok::<(), SyncError>(())
        });
        let staged =
            staged.and_then(|()| self.shared.set_item(&self.settings.selector_key, target.token()));
        if let Err(e) = staged {
            warn!(from = %current, to = %target, error = %e, "Backend switch failed, rolling back");
            for (key, previous) in copied {
                let restored = match previous {
                    Some(text) => new.set_item(key, &text),
                    None => new.remove_item(key),
                };
                if let Err(e) = restored {
                    warn!(key = %key, error = %e, "Failed to roll back migrated record");
                }
            }
            return Err(e);
        }
        self.set_active(target);

        for key in &keys {
            if let Err(e) = old.remove_item(key) {
                warn!(key = %key, area = %old.name(), error = %e, "Failed to remove migrated record");
            }
        }

        info!(
            from = %current,
            to = %target,
            migrated = keys.len(),
            reload_after,
            "Storage backend switched"
        );

        if reload_after {
            self.reload_tx.send_modify(|generation| *generation += 1);
        }
        Ok(())
    }

    /// Receiver that changes each time channels must reload.
    pub fn subscribe_reload(&self) -> watch::Receiver<u64> {
        self.reload_tx.subscribe()
    }
}
