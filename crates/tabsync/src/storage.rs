//! # Storage Areas
//!
//! Key-value areas a context can persist into.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Storage Areas                                   │
//! │                                                                         │
//! │   Origin ──── shared area (one, every context sees it)                 │
//! │     │                                                                   │
//! │     ├── Context A ──── private area A (survives reload, not close)     │
//! │     └── Context B ──── private area B                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Areas are synchronous: every operation completes before it returns and
//! no lock is held across an await.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::{SyncError, SyncResult};

/// A string key-value area with the semantics of web storage.
pub trait StorageArea: Send + Sync {
    /// Human-readable area name (for errors and logs).
    fn name(&self) -> &str;

    /// Returns the entry, or `None` when the key has no entry.
    fn get_item(&self, key: &str) -> SyncResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removing a missing key succeeds.
    fn remove_item(&self, key: &str) -> SyncResult<()>;
}

// =============================================================================
// In-Memory Area
// =============================================================================

/// In-process storage area.
///
/// Can be switched unavailable to model a host that has disabled storage;
/// every operation then fails with [`SyncError::StorageUnavailable`].
#[derive(Debug)]
pub struct MemoryArea {
    name: String,
    entries: RwLock<BTreeMap<String, String>>,
    available: AtomicBool,
}

impl MemoryArea {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryArea {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Marks the area usable or not.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Copy of every entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        match self.entries.read() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn check(&self) -> SyncResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(SyncError::StorageUnavailable {
                area: self.name.clone(),
                reason: "access denied by host".into(),
            })
        }
    }

    fn poisoned(&self) -> SyncError {
        SyncError::StorageUnavailable {
            area: self.name.clone(),
            reason: "lock poisoned".into(),
        }
    }
}

impl StorageArea for MemoryArea {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        self.check()?;
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        self.check()?;
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> SyncResult<()> {
        self.check()?;
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

/// Write/remove round-trip used to detect a disabled area.
pub fn check_writable(area: &dyn StorageArea) -> SyncResult<()> {
    const CHECK_KEY: &str = "__tabsync_check__";
    area.set_item(CHECK_KEY, CHECK_KEY)?;
    area.remove_item(CHECK_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_area_basics() {
        let area = MemoryArea::new("sessionStorage");
        assert_eq!(area.get_item("k").unwrap(), None);

        area.set_item("k", "v").unwrap();
        assert_eq!(area.get_item("k").unwrap().as_deref(), Some("v"));

        // Empty string is an entry, not an absence
        area.set_item("empty", "").unwrap();
        assert_eq!(area.get_item("empty").unwrap().as_deref(), Some(""));

        area.remove_item("k").unwrap();
        area.remove_item("missing").unwrap();
        assert_eq!(area.get_item("k").unwrap(), None);
        assert_eq!(area.snapshot().len(), 1);
    }

    #[test]
    fn test_unavailable_area() {
        let area = MemoryArea::new("localStorage");
        area.set_available(false);

        let err = area.get_item("k").unwrap_err();
        assert!(err.is_environment_error());
        assert!(check_writable(&area).is_err());

        area.set_available(true);
        assert!(check_writable(&area).is_ok());
        assert!(area.snapshot().is_empty());
    }
}
