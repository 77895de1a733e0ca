//! # Domain Types
//!
//! Core domain types used throughout the Tally ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Record      │   │   RawRecord     │   │ CollectionSpec  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id             │   │  name           │       │
//! │  │  owner_id?      │   │  owner_id?      │   │  merge policy   │       │
//! │  │  name           │   │  name           │   │  sort order     │       │
//! │  │  amount (Money) │   │  amount (enc.)  │   │  dedup_by_name  │       │
//! │  │  occurred_at    │   │  occurred_at    │   │  owner filter?  │       │
//! │  │  payload (JSON) │   │  payload (JSON) │   │  row cap?       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Record    = what the cache, reconciler and observers see (decoded)    │
//! │  RawRecord = what the remote store sends and receives (encoded)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every record has:
//! - `id`: UUID v4 - immutable, unique within its collection
//! - Natural key: case-folded `name` - human-meaningful, used to dedup
//!   collections that enforce name uniqueness (categories)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::DEFAULT_ROW_CAP;

// =============================================================================
// Natural Key Normalization
// =============================================================================

/// Normalizes a display name into a natural key.
///
/// ## Normalization Rules
/// - Leading/trailing whitespace is trimmed
/// - Unicode-aware case folding via `to_lowercase`
///
/// ## Example
/// ```rust
/// use tally_core::types::natural_key;
///
/// assert_eq!(natural_key("  Food "), "food");
/// assert_eq!(natural_key("FOOD"), natural_key("food"));
/// ```
pub fn natural_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Record
// =============================================================================

/// A decoded ledger record, as seen by the cache, the reconciler and every
/// observer.
///
/// Within one collection, `id` is unique. Display order is established by
/// the reconciler from the collection's [`SortOrder`], never by arrival
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (UUID v4 for locally-originated records).
    pub id: String,

    /// Owning user, if the collection is owner-scoped.
    /// Absent for globally-shared collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Display name. Source of the natural key for dedup collections.
    pub name: String,

    /// Decoded amount. Zero for collections without a monetary dimension.
    #[serde(default)]
    pub amount: Money,

    /// When the entry occurred. Sort key for chronological collections.
    pub occurred_at: DateTime<Utc>,

    /// Collection-specific extra fields, carried opaquely.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Record {
    /// Creates a locally-originated record with a fresh UUID v4 id.
    ///
    /// Local ids are distinct from remote-assigned ones by construction,
    /// which is what keeps pending writes free of id collisions until the
    /// remote echo replaces them.
    pub fn new(name: impl Into<String>, amount: Money) -> Self {
        Record {
            id: Uuid::new_v4().to_string(),
            owner_id: None,
            name: name.into(),
            amount,
            occurred_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the owning user (for owner-scoped collections).
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Sets the occurrence timestamp.
    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    /// Attaches collection-specific payload fields.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Returns the record's normalized natural key.
    pub fn natural_key(&self) -> String {
        natural_key(&self.name)
    }
}

// =============================================================================
// Raw Record (wire form)
// =============================================================================

/// A record in the remote store's wire form.
///
/// The remote store holds amounts in an encoded string form; the engine's
/// codec collaborator decodes them into [`Money`] before any record reaches
/// the cache. Decoding is tolerant: a malformed amount becomes zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Unique identifier.
    pub id: String,

    /// Owning user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Display name.
    pub name: String,

    /// Encoded amount field, decoded by the engine's codec.
    #[serde(default)]
    pub amount: String,

    /// Occurrence timestamp, RFC 3339.
    pub occurred_at: String,

    /// Collection-specific extra fields.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

// =============================================================================
// Merge Policy
// =============================================================================

/// How a collection's records are partitioned across users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Every record belongs to one owner; observers are filtered by
    /// `owner_id` before delivery.
    OwnerScoped,

    /// Shared across all users; no owner filtering.
    #[default]
    Global,
}

impl MergePolicy {
    /// Returns true if observers of this collection are owner-filtered.
    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, MergePolicy::OwnerScoped)
    }
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::OwnerScoped => write!(f, "owner_scoped"),
            MergePolicy::Global => write!(f, "global"),
        }
    }
}

// =============================================================================
// Sort Order
// =============================================================================

/// Collection-defined natural display order, applied by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Lexical by natural key (categories, users).
    NameLexical,

    /// Newest first by `occurred_at` (transactions, periods, audit events).
    #[default]
    ReverseChronological,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::NameLexical => write!(f, "name_lexical"),
            SortOrder::ReverseChronological => write!(f, "reverse_chronological"),
        }
    }
}

// =============================================================================
// Collection Spec
// =============================================================================

/// Everything the engine needs to know about one collection: identity,
/// merge policy, ordering, dedup behavior, and subscription shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name, unique within the catalog.
    pub name: String,

    /// Owner partitioning policy.
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// Natural display order.
    #[serde(default)]
    pub sort_order: SortOrder,

    /// Whether the collection enforces name uniqueness and therefore
    /// participates in natural-key tombstoning.
    #[serde(default)]
    pub dedup_by_name: bool,

    /// Optional equality filter pushed down to the remote subscription
    /// (`owner_id == filter_owner`). When set, snapshots only cover that
    /// owner and the reconciler preserves other owners' cached rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_owner: Option<String>,

    /// Maximum rows retained from a snapshot.
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,
}

fn default_row_cap() -> usize {
    DEFAULT_ROW_CAP
}

impl CollectionSpec {
    /// Creates a spec with defaults: global, reverse chronological, no dedup.
    pub fn new(name: impl Into<String>) -> Self {
        CollectionSpec {
            name: name.into(),
            merge_policy: MergePolicy::default(),
            sort_order: SortOrder::default(),
            dedup_by_name: false,
            filter_owner: None,
            row_cap: default_row_cap(),
        }
    }

    /// Marks the collection as owner-scoped.
    pub fn owner_scoped(mut self) -> Self {
        self.merge_policy = MergePolicy::OwnerScoped;
        self
    }

    /// Sets lexical-by-name ordering.
    pub fn sorted_by_name(mut self) -> Self {
        self.sort_order = SortOrder::NameLexical;
        self
    }

    /// Enables natural-key deduplication (and dual-key tombstoning).
    pub fn dedup_by_name(mut self) -> Self {
        self.dedup_by_name = true;
        self
    }

    /// Scopes the remote subscription to a single owner.
    pub fn filtered_to_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.filter_owner = Some(owner_id.into());
        self
    }

    /// Overrides the snapshot row cap.
    pub fn with_row_cap(mut self, cap: usize) -> Self {
        self.row_cap = cap;
        self
    }
}

// =============================================================================
// Built-in Catalog
// =============================================================================

/// Collection name constants for the built-in ledger catalog.
pub mod collections {
    pub const CATEGORIES: &str = "categories";
    pub const PERIODS: &str = "periods";
    pub const TRANSACTIONS: &str = "transactions";
    pub const TEMPLATES: &str = "templates";
    pub const USERS: &str = "users";
    pub const APPEALS: &str = "appeals";
    pub const AUDIT_EVENTS: &str = "audit-events";
}

/// Returns the built-in ledger collection catalog.
///
/// ## Catalog Policy
/// ```text
/// ┌──────────────┬──────────────┬────────────────────────┬───────────────┐
/// │ Collection   │ Merge policy │ Sort order             │ Name dedup    │
/// ├──────────────┼──────────────┼────────────────────────┼───────────────┤
/// │ categories   │ global       │ lexical by name        │ yes           │
/// │ periods      │ owner-scoped │ reverse chronological  │ no            │
/// │ transactions │ owner-scoped │ reverse chronological  │ no            │
/// │ templates    │ owner-scoped │ reverse chronological  │ no            │
/// │ users        │ global       │ lexical by name        │ no            │
/// │ appeals      │ global       │ reverse chronological  │ no            │
/// │ audit-events │ global       │ reverse chronological  │ no            │
/// └──────────────┴──────────────┴────────────────────────┴───────────────┘
/// ```
/// Only `categories` enforces a name-uniqueness invariant, so it is the
/// only collection that participates in natural-key tombstoning.
pub fn catalog() -> Vec<CollectionSpec> {
    vec![
        CollectionSpec::new(collections::CATEGORIES)
            .sorted_by_name()
            .dedup_by_name(),
        CollectionSpec::new(collections::PERIODS).owner_scoped(),
        CollectionSpec::new(collections::TRANSACTIONS).owner_scoped(),
        CollectionSpec::new(collections::TEMPLATES).owner_scoped(),
        CollectionSpec::new(collections::USERS).sorted_by_name(),
        CollectionSpec::new(collections::APPEALS),
        CollectionSpec::new(collections::AUDIT_EVENTS),
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_normalization() {
        assert_eq!(natural_key("  Food "), "food");
        assert_eq!(natural_key("FOOD"), "food");
        assert_eq!(natural_key("Groceries"), natural_key("gRoCeRiEs"));
        assert_eq!(natural_key(""), "");
    }

    #[test]
    fn test_record_new_generates_unique_ids() {
        let a = Record::new("Food", Money::zero());
        let b = Record::new("Food", Money::zero());
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_record_builder() {
        let rec = Record::new("Rent", Money::from_cents(-120_000))
            .with_owner("alice")
            .with_payload(serde_json::json!({"note": "march"}));

        assert_eq!(rec.owner_id.as_deref(), Some("alice"));
        assert_eq!(rec.natural_key(), "rent");
        assert_eq!(rec.payload["note"], "march");
    }

    #[test]
    fn test_collection_spec_builder() {
        let spec = CollectionSpec::new("categories")
            .sorted_by_name()
            .dedup_by_name()
            .with_row_cap(100);

        assert_eq!(spec.merge_policy, MergePolicy::Global);
        assert_eq!(spec.sort_order, SortOrder::NameLexical);
        assert!(spec.dedup_by_name);
        assert_eq!(spec.row_cap, 100);
        assert!(spec.filter_owner.is_none());
    }

    #[test]
    fn test_catalog_shape() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 7);

        let categories = catalog
            .iter()
            .find(|s| s.name == collections::CATEGORIES)
            .unwrap();
        assert!(categories.dedup_by_name);
        assert_eq!(categories.sort_order, SortOrder::NameLexical);
        assert_eq!(categories.merge_policy, MergePolicy::Global);

        let transactions = catalog
            .iter()
            .find(|s| s.name == collections::TRANSACTIONS)
            .unwrap();
        assert!(transactions.merge_policy.is_owner_scoped());
        assert_eq!(transactions.sort_order, SortOrder::ReverseChronological);
        assert!(!transactions.dedup_by_name);

        // Only categories participates in natural-key tombstoning
        assert_eq!(catalog.iter().filter(|s| s.dedup_by_name).count(), 1);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let rec = Record::new("Transport", Money::from_cents(-450)).with_owner("bob");
        let json = serde_json::to_string(&rec).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
