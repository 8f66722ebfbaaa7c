//! Context identities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one context (tab).
///
/// Ordered, so it doubles as the election token: when two candidates
/// campaign at once, the higher id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        ContextId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ContextId(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
