//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-engine errors (separate crate)                                  │
//! │  └── EngineError      - Transport, deadline, decode failures           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → UI caller           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (collection, id, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent domain rule violations. They should be caught and
/// translated to user-friendly messages by the UI collaborator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record cannot be found in a collection.
    ///
    /// ## When This Occurs
    /// - Deleting an id that is neither cached nor known remotely
    /// - A read-back for an id the remote store never echoed
    #[error("Record not found in {collection}: {id}")]
    RecordNotFound { collection: String, id: String },

    /// The named collection is not part of the catalog.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A record was submitted to a collection whose merge policy requires
    /// an owner, but the record carries none.
    ///
    /// ## When This Occurs
    /// - Writing a transaction or period without an `owner_id`
    /// - A caller forgetting to stamp the signed-in user onto the record
    #[error("Collection {collection} is owner-scoped but record {id} has no owner")]
    MissingOwner { collection: String, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a locally-issued record doesn't meet requirements.
/// Used for early validation before the optimistic write is applied.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid collection name).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate category name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
