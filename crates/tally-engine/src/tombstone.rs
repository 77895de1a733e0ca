//! # Tombstone Registry
//!
//! Records entities whose deletion has been requested locally but not yet
//! reflected by the remote store, so stale snapshots cannot resurrect them.
//!
//! ## Dual-Key Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Tombstone Registry                                  │
//! │                                                                         │
//! │  delete("c1", "food")                                                  │
//! │       │                                                                 │
//! │       ├──► id set:          { "c1" }                                   │
//! │       └──► natural-key set: { "food" }  (dedup collections only)       │
//! │                                                                         │
//! │  WHY TWO KEYS?                                                         │
//! │  ──────────────                                                        │
//! │  A stale snapshot may carry the deleted row under its remote id        │
//! │  ("c1") - the id set suppresses it. A dedup-prone collection may       │
//! │  also re-echo the row under a DIFFERENT id after a remote-side         │
//! │  rewrite, where only the name survives - the key set suppresses that.  │
//! │                                                                         │
//! │  CREATE CANCELS TOMBSTONE                                              │
//! │  ────────────────────────                                              │
//! │  delete "Food", then re-add "Food" before the remote confirms:         │
//! │  clear_key("food") retires the key half so the new create is not       │
//! │  itself suppressed. The old id stays tombstoned.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are retained until a snapshot confirms absence; there is no
//! expiry. A tombstone for an entity the remote store never deletes
//! persists for the process lifetime - an accepted limitation given the
//! absence of a durable local store.

use std::collections::{HashMap, HashSet};

use tracing::debug;

// =============================================================================
// Tombstone Registry
// =============================================================================

/// Registry of pending deletions, keyed by record id and by normalized
/// natural key.
#[derive(Debug, Default)]
pub struct TombstoneRegistry {
    /// Ids with a pending deletion, mapped to the natural key recorded
    /// alongside them (empty when the collection does not dedup by name).
    by_id: HashMap<String, String>,

    /// Natural keys with a pending deletion.
    by_key: HashSet<String>,
}

impl TombstoneRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending deletion under both keys.
    ///
    /// Pass an empty `natural_key` for collections that do not enforce
    /// name uniqueness; only the id half is recorded then.
    pub fn mark_deleted(&mut self, id: impl Into<String>, natural_key: impl Into<String>) {
        let id = id.into();
        let key = natural_key.into();

        debug!(id = %id, key = %key, "Recording tombstone");

        if !key.is_empty() {
            self.by_key.insert(key.clone());
        }
        self.by_id.insert(id, key);
    }

    /// Returns true if the id has a pending deletion.
    pub fn is_deleted(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Returns true if the natural key has a pending deletion.
    pub fn is_deleted_by_key(&self, natural_key: &str) -> bool {
        self.by_key.contains(natural_key)
    }

    /// Cancels the natural-key half of a tombstone.
    ///
    /// Called on the create path when a new record reuses a tombstoned
    /// key, so the re-add is not suppressed. The id half stays in place to
    /// keep filtering the old row out of stale snapshots.
    pub fn clear_key(&mut self, natural_key: &str) {
        if self.by_key.remove(natural_key) {
            debug!(key = %natural_key, "Tombstone key cancelled by create");
        }
    }

    /// Retires tombstones whose ids are absent from the latest snapshot.
    ///
    /// The remote store has caught up with those deletions, so their
    /// entries (and any paired natural keys) are no longer needed.
    pub fn confirm_absent(&mut self, snapshot_ids: &HashSet<&str>) {
        let confirmed: Vec<String> = self
            .by_id
            .keys()
            .filter(|id| !snapshot_ids.contains(id.as_str()))
            .cloned()
            .collect();

        for id in confirmed {
            if let Some(key) = self.by_id.remove(&id) {
                if !key.is_empty() {
                    self.by_key.remove(&key);
                }
                debug!(id = %id, "Tombstone retired: remote confirmed absence");
            }
        }
    }

    /// Returns the number of pending id tombstones.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if no deletions are pending.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_query() {
        let mut reg = TombstoneRegistry::new();
        assert!(reg.is_empty());

        reg.mark_deleted("c1", "food");
        assert!(reg.is_deleted("c1"));
        assert!(reg.is_deleted_by_key("food"));
        assert!(!reg.is_deleted("c2"));
        assert!(!reg.is_deleted_by_key("transport"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_id_only_tombstone() {
        let mut reg = TombstoneRegistry::new();
        reg.mark_deleted("t1", "");

        assert!(reg.is_deleted("t1"));
        assert!(!reg.is_deleted_by_key(""));
    }

    #[test]
    fn test_clear_key_keeps_id_half() {
        let mut reg = TombstoneRegistry::new();
        reg.mark_deleted("c1", "food");

        // Re-add of "Food" cancels the key half only
        reg.clear_key("food");
        assert!(!reg.is_deleted_by_key("food"));
        assert!(reg.is_deleted("c1"));
    }

    #[test]
    fn test_confirm_absent_retires_both_halves() {
        let mut reg = TombstoneRegistry::new();
        reg.mark_deleted("c1", "food");
        reg.mark_deleted("c2", "rent");

        // Snapshot still contains c1 (stale) but no longer c2
        let snapshot: HashSet<&str> = ["c1", "c9"].into_iter().collect();
        reg.confirm_absent(&snapshot);

        assert!(reg.is_deleted("c1"));
        assert!(reg.is_deleted_by_key("food"));
        assert!(!reg.is_deleted("c2"));
        assert!(!reg.is_deleted_by_key("rent"));
    }

    #[test]
    fn test_confirm_absent_with_empty_snapshot_clears_all() {
        let mut reg = TombstoneRegistry::new();
        reg.mark_deleted("a", "alpha");
        reg.mark_deleted("b", "");

        reg.confirm_absent(&HashSet::new());
        assert!(reg.is_empty());
    }
}
