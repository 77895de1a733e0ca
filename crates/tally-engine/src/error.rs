//! # Engine Error Types
//!
//! Error types for reconciliation engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transport     │  │    Write path   │  │     Decode              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  RemoteUnavail. │  │  DeadlineExc.   │  │  DecodeFailed           │ │
//! │  │  SubscribeFailed│  │  WriteRejected  │  │  (swallowed at the      │ │
//! │  │                 │  │                 │  │   listener, never UI)   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  InvalidConfig  │  │  ChannelError   │                              │
//! │  │  ConfigLoad/Save│  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │                                                                         │
//! │  Propagation policy:                                                   │
//! │  • Read-path errors never reach the UI - reads degrade to the cache.  │
//! │  • Write-path errors are surfaced once per call and never roll back   │
//! │    the optimistic mutation.                                            │
//! │  • Decode errors are swallowed per record (default substituted).      │
//! │  • No error is fatal to the process.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering all reconciliation failure modes.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The remote store is unreachable. The engine degrades to offline
    /// mode: reads keep serving from the cache, writes stay local-only.
    #[error("Remote store unreachable: {0}")]
    RemoteUnavailable(String),

    /// A collection subscription could not be established.
    #[error("Failed to subscribe to {collection}: {reason}")]
    SubscribeFailed { collection: String, reason: String },

    // =========================================================================
    // Write-Path Errors
    // =========================================================================
    /// A remote write exceeded its deadline. The operation was NOT
    /// cancelled and may still complete; the optimistic local state is
    /// retained either way.
    #[error("Remote write exceeded deadline of {0} seconds (outcome unknown)")]
    DeadlineExceeded(u64),

    /// The remote store rejected a write outright.
    #[error("Remote store rejected write to {collection}: {reason}")]
    WriteRejected { collection: String, reason: String },

    // =========================================================================
    // Decode Errors
    // =========================================================================
    /// A remote record's encoded field could not be decoded. Never
    /// propagated past the listener; the record gets a default value.
    #[error("Failed to decode field for record {record_id}: {reason}")]
    DecodeFailed { record_id: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Domain rule violation (wraps tally-core errors).
    #[error(transparent)]
    Core(#[from] tally_core::CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The engine is shutting down.
    #[error("Engine is shutting down")]
    ShuttingDown,

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tally_core::ValidationError> for EngineError {
    fn from(err: tally_core::ValidationError) -> Self {
        EngineError::Core(err.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for degrade/retry logic)
// =============================================================================

impl EngineError {
    /// Returns true if this error is recoverable and the operation can be
    /// retried (or, for subscriptions, resubscribed with backoff).
    ///
    /// ## Retryable Errors
    /// - Remote unreachable (network issues)
    /// - Deadline exceeded (outcome unknown, safe to retry idempotently)
    /// - Subscription failures
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Domain/validation errors
    /// - Explicit write rejections
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::RemoteUnavailable(_)
                | EngineError::DeadlineExceeded(_)
                | EngineError::SubscribeFailed { .. }
        )
    }

    /// Returns true if this error indicates the remote store is
    /// unreachable and the engine should run in degraded (offline) mode.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::RemoteUnavailable(_) | EngineError::SubscribeFailed { .. }
        )
    }

    /// Returns true if this is a write-path error: surfaced to the caller
    /// once, but the optimistic local mutation is never rolled back.
    pub fn is_write_error(&self) -> bool {
        matches!(
            self,
            EngineError::DeadlineExceeded(_)
                | EngineError::WriteRejected { .. }
                | EngineError::RemoteUnavailable(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}
