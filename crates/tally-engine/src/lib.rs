//! # tally-engine: Reconciliation Engine for the Tally Ledger
//!
//! This crate provides the hybrid reconciliation layer for the Tally
//! ledger: a local in-process cache merged continuously with an
//! authoritative remote store, serving consistent views to any number of
//! observers while staying responsive when the remote is slow or away.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Reconciliation Engine Architecture                  │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  LedgerEngine (Main Orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  Single event loop over handle commands + listener snapshots    │  │
//! │  │  Owns the cache, tombstone registries, and notifier              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │SnapshotListener│  │  Reconciler    │  │   ChannelNotifier      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ One per        │  │ Pure merge of  │  │ Clone-per-subscriber   │    │
//! │  │ collection;    │  │ snapshot +     │  │ fanout; late-sub       │    │
//! │  │ resubscribes   │  │ cache +        │  │ replay; owner          │    │
//! │  │ with backoff   │  │ tombstones     │  │ filtering              │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  WRITE MODEL (optimistic, never rolled back):                          │
//! │  ────────────────────────────────────────────                          │
//! │  add/delete ─► validate ─► mutate cache ─► publish ─► remote op        │
//! │                                              under a deadline that     │
//! │                                              does NOT cancel the op    │
//! │                                                                         │
//! │  DELETE MODEL (dual-key tombstones):                                   │
//! │  ───────────────────────────────────                                   │
//! │  Deletions are tombstoned by id, and by normalized name for           │
//! │  collections that dedup by name, so stale snapshots cannot            │
//! │  resurrect deleted rows. A re-create of the same name cancels the     │
//! │  key half of the tombstone.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Main `LedgerEngine` orchestrator and `LedgerHandle`
//! - [`cache`] - In-process per-collection record cache
//! - [`tombstone`] - Dual-key pending-deletion registry
//! - [`reconcile`] - Pure snapshot/cache/tombstone merge
//! - [`listener`] - Per-collection remote subscription with backoff
//! - [`notify`] - Multi-observer view fanout with replay
//! - [`remote`] - `RemoteStore` trait seam and amount codec
//! - [`deadline`] - Timeout-without-cancellation executor
//! - [`config`] - Engine configuration (file + environment)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_core::{catalog, Money, Record};
//! use tally_engine::{EngineConfig, LedgerEngine, PlainCodec};
//!
//! let config = EngineConfig::load_or_default(None);
//! let handle = LedgerEngine::spawn(&config, remote_store, Arc::new(PlainCodec), catalog());
//!
//! // Observe a collection; views arrive on every change.
//! let (_id, mut views) = handle.subscribe("categories").await?;
//!
//! // Optimistic write: visible to observers immediately, remote outcome
//! // reported through the returned result.
//! handle.add_record("categories", Record::new("Food", Money::zero())).await?;
//!
//! while let Some(view) = views.recv().await {
//!     println!("categories now has {} rows", view.len());
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod listener;
pub mod notify;
pub mod reconcile;
pub mod remote;
pub mod tombstone;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ChannelSettings, EngineConfig, ListenerSettings, WriteSettings};
pub use deadline::DeadlineExecutor;
pub use engine::{EngineStatus, LedgerEngine, LedgerHandle};
pub use error::{EngineError, EngineResult};
pub use listener::{ListenerConfig, ListenerEvent};
pub use notify::{ChannelNotifier, SubscriptionId};
pub use reconcile::reconcile;
pub use remote::{AmountCodec, PlainCodec, RemoteEvent, RemoteStore};
pub use tombstone::TombstoneRegistry;
