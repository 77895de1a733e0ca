//! # Validation Module
//!
//! Input validation for locally-issued records.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI collaborator (out of scope)                               │
//! │  ├── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before the optimistic write)                    │
//! │  ├── Field presence and length                                         │
//! │  ├── Amount bounds                                                     │
//! │  └── Owner requirements per merge policy                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote store (its own schema rules)                          │
//! │                                                                         │
//! │  Defense in depth: an invalid record must never become a pending       │
//! │  write, because pending writes survive until the remote echoes them.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{MergePolicy, Record};
use crate::{MAX_AMOUNT_CENTS, MAX_COLLECTION_NAME_LENGTH, MAX_NAME_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a collection name.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 40 characters
/// - Lowercase alphanumeric plus hyphens only
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_collection_name;
///
/// assert!(validate_collection_name("audit-events").is_ok());
/// assert!(validate_collection_name("").is_err());
/// assert!(validate_collection_name("Has Space").is_err());
/// ```
pub fn validate_collection_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "collection".to_string(),
        });
    }

    if name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "collection".to_string(),
            max: MAX_COLLECTION_NAME_LENGTH,
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "collection".to_string(),
            reason: "must contain only lowercase letters, digits, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates a record display name.
///
/// ## Rules
/// - Must not be empty (the name doubles as the natural key)
/// - Must be at most 120 characters
pub fn validate_record_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an amount in cents from local input.
///
/// ## Rules
/// - Magnitude must not exceed `MAX_AMOUNT_CENTS`
/// - Negative values are allowed (expenses)
/// - Zero is allowed (non-monetary collections)
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents(-120_000).is_ok()); // rent
/// assert!(validate_amount_cents(0).is_ok());
/// assert!(validate_amount_cents(i64::MAX).is_err());
/// ```
pub fn validate_amount_cents(cents: i64) -> ValidationResult<()> {
    if cents.saturating_abs() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: -MAX_AMOUNT_CENTS,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a record id.
///
/// ## Rules
/// - Must not be empty
/// - Locally-originated ids must be valid UUIDs; remote-assigned ids are
///   accepted as-is elsewhere (this validator only guards local writes)
pub fn validate_record_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Record Validator
// =============================================================================

/// Validates the fields of a locally-issued record.
pub fn validate_record(record: &Record) -> ValidationResult<()> {
    validate_record_id(&record.id)?;
    validate_record_name(&record.name)?;
    validate_amount_cents(record.amount.cents())?;
    Ok(())
}

/// Validates a full local write: collection name, record fields, and the
/// owner requirement of the collection's merge policy.
///
/// This runs before the optimistic cache append; a record that fails here
/// never becomes a pending write.
pub fn validate_write(
    collection: &str,
    record: &Record,
    merge_policy: MergePolicy,
) -> CoreResult<()> {
    validate_collection_name(collection)?;
    validate_record(record)?;

    if merge_policy.is_owner_scoped() && record.owner_id.as_deref().unwrap_or("").is_empty() {
        return Err(CoreError::MissingOwner {
            collection: collection.to_string(),
            id: record.id.clone(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
