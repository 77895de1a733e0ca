//! # Local Cache Store
//!
//! In-process mapping from collection name to an ordered set of records,
//! serving as both the offline fallback and the optimistic overlay.
//!
//! All mutations are synchronous and immediately visible to subsequent
//! reads; asynchrony lives entirely in how the snapshot listeners feed the
//! engine loop, never inside the store itself. The store is seeded empty at
//! process start and never persisted - durability belongs to the remote
//! store by explicit scope boundary.

use std::collections::HashMap;

use tally_core::Record;

// =============================================================================
// Cache Store
// =============================================================================

/// Per-collection record cache owned by the engine instance.
///
/// One store per engine, constructed once at startup and passed by
/// reference to the reconciler - no hidden global state, same
/// single-instance semantics.
#[derive(Debug, Default)]
pub struct CacheStore {
    collections: HashMap<String, Vec<Record>>,
}

impl CacheStore {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached rows for a collection, in reconciled order.
    ///
    /// A collection that has never been written or reconciled yields an
    /// empty slice, not an absence.
    pub fn rows(&self, collection: &str) -> &[Record] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Appends a record to a collection (optimistic local write).
    pub fn append(&mut self, collection: &str, record: Record) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    /// Replaces a collection's rows wholesale (post-reconciliation).
    pub fn replace(&mut self, collection: &str, records: Vec<Record>) {
        self.collections.insert(collection.to_string(), records);
    }

    /// Removes a record by id. Returns true if a row was removed.
    pub fn remove(&mut self, collection: &str, id: &str) -> bool {
        match self.collections.get_mut(collection) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|r| r.id != id);
                rows.len() != before
            }
            None => false,
        }
    }

    /// Returns the number of cached rows in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.rows(collection).len()
    }

    /// Returns true if the collection has no cached rows.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.rows(collection).is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
