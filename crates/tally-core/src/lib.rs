//! # tally-core: Pure Domain Logic for the Tally Ledger
//!
//! This crate is the **heart** of the Tally ledger. It contains the domain
//! types and rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tally Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Ledger UI (out of scope)                   │   │
//! │  │    Forms ──► Charts ──► Role gating ──► Rendering               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ subscribe / add / delete               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tally-engine (Reconciliation)                   │   │
//! │  │    Cache ──► Tombstones ──► Reconciler ──► Channel fan-out      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ★ tally-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   error   │  │ validation│  │   │
//! │  │   │  Record   │  │   Money   │  │ CoreError │  │   rules   │  │   │
//! │  │   │ Catalog   │  │  (cents)  │  │ Validation│  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO REMOTE STORE • PURE FUNCTIONS       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Record, RawRecord, CollectionSpec, catalog)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Record validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Network, file system, and remote store access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::{natural_key, Record};
//!
//! let rent = Record::new("Rent", Money::from_cents(-120_000));
//!
//! // Natural keys are case-folded for dedup-prone collections
//! assert_eq!(natural_key("  Rent "), natural_key("RENT"));
//! assert_eq!(rent.amount.cents(), -120_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tally_core::Money` instead of
// `use tally_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a record display name.
///
/// ## Business Reason
/// Names double as natural keys for dedup-prone collections, so runaway
/// strings would bloat every tombstone and merged view that carries them.
pub const MAX_NAME_LENGTH: usize = 120;

/// Maximum length of a collection name.
pub const MAX_COLLECTION_NAME_LENGTH: usize = 40;

/// Largest amount magnitude accepted from local input, in cents.
///
/// ## Business Reason
/// Prevents accidental over-entry (e.g., typing 1000000 instead of 100.00)
/// in a personal-finance context. Remote records are not bounded by this;
/// only locally-issued writes are validated.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000;

/// Default row cap applied to a collection subscription when the
/// configuration does not override it.
pub const DEFAULT_ROW_CAP: usize = 5_000;
