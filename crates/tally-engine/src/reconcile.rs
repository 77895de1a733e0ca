//! # Reconciler
//!
//! Merges an incoming remote snapshot with the local cache and the
//! tombstone registry to produce the new authoritative view.
//!
//! ## Merge Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Steps                               │
//! │                                                                         │
//! │  1. Filter the snapshot through the tombstone registry:                │
//! │     drop rows tombstoned by id, and (dedup collections only)           │
//! │     rows whose normalized name is tombstoned by key.                   │
//! │                                                                         │
//! │  2. remote_ids = ids of the filtered snapshot.                         │
//! │                                                                         │
//! │  3. pending = cached rows the remote has not echoed back:              │
//! │     id ∉ remote_ids, id not tombstoned, and (dedup collections)        │
//! │     natural key neither tombstoned nor already present remotely        │
//! │     (remote wins once it appears).                                     │
//! │                                                                         │
//! │  4. Owner-scoped snapshot: cached rows of OTHER owners pass through    │
//! │     untouched:  merged = others ∪ filtered_remote ∪ pending            │
//! │                                                                         │
//! │  5. Unscoped snapshot:     merged = filtered_remote ∪ pending          │
//! │                                                                         │
//! │  6. Sort by the collection's natural order and return.                 │
//! │                                                                         │
//! │  The merge is IDEMPOTENT: identical inputs yield identical outputs,    │
//! │  so repeated snapshot notifications are safe.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is pure business logic: no I/O, no channels, no clocks. The engine
//! loop owns the surrounding state and feeds it in by reference.

use std::cmp::Ordering;
use std::collections::HashSet;

use tally_core::{CollectionSpec, Record, SortOrder};

use crate::tombstone::TombstoneRegistry;

// =============================================================================
// Reconcile
// =============================================================================

/// Produces the merged authoritative view for one collection.
///
/// `remote_snapshot` is the full decoded collection as the remote store
/// last reported it; `cached_rows` is the current local view including any
/// optimistic writes. The caller replaces the cache entry with the result.
pub fn reconcile(
    spec: &CollectionSpec,
    remote_snapshot: Vec<Record>,
    cached_rows: &[Record],
    tombstones: &TombstoneRegistry,
) -> Vec<Record> {
    // Step 1: tombstone-filter the snapshot. A stale snapshot may still
    // carry rows whose deletion the remote has not processed yet.
    let filtered_remote: Vec<Record> = remote_snapshot
        .into_iter()
        .filter(|r| !tombstones.is_deleted(&r.id))
        .filter(|r| !spec.dedup_by_name || !tombstones.is_deleted_by_key(&r.natural_key()))
        .collect();

    // Step 2
    let remote_ids: HashSet<&str> = filtered_remote.iter().map(|r| r.id.as_str()).collect();
    let remote_keys: HashSet<String> = if spec.dedup_by_name {
        filtered_remote.iter().map(|r| r.natural_key()).collect()
    } else {
        HashSet::new()
    };

    // Steps 3-4: split the cache into this snapshot's scope and the rest.
    let scope_owner = spec.filter_owner.as_deref();
    let mut others: Vec<Record> = Vec::new();
    let mut pending: Vec<Record> = Vec::new();

    for row in cached_rows {
        // Rows outside a scoped snapshot's owner are not covered by this
        // snapshot at all; they pass through untouched.
        if let Some(owner) = scope_owner {
            if row.owner_id.as_deref() != Some(owner) {
                others.push(row.clone());
                continue;
            }
        }

        if remote_ids.contains(row.id.as_str()) {
            // Echoed back by the remote: no longer pending.
            continue;
        }
        if tombstones.is_deleted(&row.id) {
            continue;
        }
        if spec.dedup_by_name {
            let key = row.natural_key();
            if tombstones.is_deleted_by_key(&key) || remote_keys.contains(&key) {
                // Remote wins once a row with the same natural key appears.
                continue;
            }
        }

        pending.push(row.clone());
    }

    // Steps 5-6
    let mut merged = others;
    merged.extend(filtered_remote);
    merged.extend(pending);
    sort_rows(&mut merged, spec.sort_order);
    merged
}

/// Sorts rows into the collection's natural display order.
///
/// Ties break on id so the result is deterministic regardless of input
/// order, which is what makes the merge idempotent end to end.
pub(crate) fn sort_rows(rows: &mut [Record], order: SortOrder) {
    match order {
        SortOrder::NameLexical => rows.sort_by(|a, b| {
            a.natural_key()
                .cmp(&b.natural_key())
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortOrder::ReverseChronological => rows.sort_by(|a, b| {
            match b.occurred_at.cmp(&a.occurred_at) {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            }
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tally_core::Money;

    fn categories_spec() -> CollectionSpec {
        CollectionSpec::new("categories").sorted_by_name().dedup_by_name()
    }

    fn record(id: &str, name: &str) -> Record {
        Record {
            id: id.to_string(),
            owner_id: None,
            name: name.to_string(),
            amount: Money::zero(),
            occurred_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    fn owned(id: &str, name: &str, owner: &str) -> Record {
        let mut r = record(id, name);
        r.owner_id = Some(owner.to_string());
        r
    }

    #[test]
    fn test_remote_echo_clears_pending() {
        // Worked example: cache has c1, remote now has c1 and c2.
        let spec = categories_spec();
        let tombstones = TombstoneRegistry::new();
        let cache = vec![record("c1", "Food")];
        let snapshot = vec![record("c1", "Food"), record("c2", "Transport")];

        let merged = reconcile(&spec, snapshot, &cache, &tombstones);

        assert_eq!(merged.len(), 2);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]); // food < transport
    }

    #[test]
    fn test_tombstone_suppresses_stale_snapshot() {
        // delete(c1) recorded; stale snapshot still contains c1.
        let spec = categories_spec();
        let mut tombstones = TombstoneRegistry::new();
        tombstones.mark_deleted("c1", "food");

        let cache = vec![record("c2", "Transport")];
        let snapshot = vec![record("c1", "Food"), record("c2", "Transport")];

        let merged = reconcile(&spec, snapshot, &cache, &tombstones);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "c2");
    }

    #[test]
    fn test_natural_key_tombstone_suppresses_renamed_id() {
        // A remote-side rewrite re-echoes the deleted row under a new id;
        // only the natural key identifies it as the deleted entity.
        let spec = categories_spec();
        let mut tombstones = TombstoneRegistry::new();
        tombstones.mark_deleted("c1", "food");

        let snapshot = vec![record("c9", "FOOD"), record("c2", "Transport")];
        let merged = reconcile(&spec, snapshot, &[], &tombstones);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "c2");
    }

    #[test]
    fn test_key_tombstone_only_applies_to_dedup_collections() {
        // Two transactions may legitimately share a name.
        let spec = CollectionSpec::new("transactions");
        let mut tombstones = TombstoneRegistry::new();
        tombstones.mark_deleted("t1", "lunch");

        let snapshot = vec![record("t1", "Lunch"), record("t2", "Lunch")];
        let merged = reconcile(&spec, snapshot, &[], &tombstones);

        // t1 suppressed by id; t2 survives despite the shared name.
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "t2");
    }

    #[test]
    fn test_pending_write_survives_until_echoed() {
        let spec = categories_spec();
        let tombstones = TombstoneRegistry::new();

        // Local create not yet echoed by the remote.
        let cache = vec![record("local-1", "Savings")];
        let snapshot = vec![record("c2", "Transport")];

        let merged = reconcile(&spec, snapshot, &cache, &tombstones);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["local-1", "c2"]); // savings < transport
    }

    #[test]
    fn test_remote_wins_duplicate_natural_key() {
        // The remote assigned its own id to the echoed create; the local
        // pending row with the same name must not linger as a duplicate.
        let spec = categories_spec();
        let tombstones = TombstoneRegistry::new();

        let cache = vec![record("local-1", "Savings")];
        let snapshot = vec![record("c7", "savings")];

        let merged = reconcile(&spec, snapshot, &cache, &tombstones);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "c7");
    }

    #[test]
    fn test_owner_scoped_snapshot_preserves_other_owners() {
        let spec = CollectionSpec::new("transactions")
            .owner_scoped()
            .filtered_to_owner("alice");
        let tombstones = TombstoneRegistry::new();

        let cache = vec![
            owned("t1", "Lunch", "alice"),
            owned("t2", "Dinner", "bob"),
        ];
        // Scoped snapshot covers alice only; it says t1 is gone remotely
        // and t3 now exists.
        let snapshot = vec![owned("t3", "Coffee", "alice")];

        let merged = reconcile(&spec, snapshot, &cache, &tombstones);
        let ids: HashSet<&str> = merged.iter().map(|r| r.id.as_str()).collect();

        // bob's row passes through untouched; alice's t1 stays pending
        // (not tombstoned, just not yet echoed), t3 arrives.
        assert!(ids.contains("t2"));
        assert!(ids.contains("t3"));
        assert!(ids.contains("t1"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_reverse_chronological_order() {
        let spec = CollectionSpec::new("transactions");
        let tombstones = TombstoneRegistry::new();
        let now = Utc::now();

        let mut older = record("t-old", "Rent");
        older.occurred_at = now - Duration::days(3);
        let mut newer = record("t-new", "Coffee");
        newer.occurred_at = now;

        let merged = reconcile(&spec, vec![older, newer], &[], &tombstones);
        assert_eq!(merged[0].id, "t-new");
        assert_eq!(merged[1].id, "t-old");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let spec = categories_spec();
        let mut tombstones = TombstoneRegistry::new();
        tombstones.mark_deleted("c3", "debt");

        let cache = vec![record("local-1", "Savings"), record("c1", "Food")];
        let snapshot = vec![
            record("c1", "Food"),
            record("c2", "Transport"),
            record("c3", "Debt"),
        ];

        let first = reconcile(&spec, snapshot.clone(), &cache, &tombstones);
        let second = reconcile(&spec, snapshot, &first, &tombstones);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs_yield_empty_view() {
        let spec = categories_spec();
        let tombstones = TombstoneRegistry::new();
        let merged = reconcile(&spec, Vec::new(), &[], &tombstones);
        assert!(merged.is_empty());
    }
}
