//! # Snapshot Listener
//!
//! Per-collection background task that keeps a remote subscription alive,
//! decodes incoming snapshots, and feeds them to the engine loop.
//!
//! ## Subscription Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Snapshot Listener Lifecycle                          │
//! │                                                                         │
//! │  ┌────────────┐  subscribe()   ┌────────────┐                          │
//! │  │  Starting  │ ─────────────► │ Subscribed │ ──┐                      │
//! │  └────────────┘                └─────┬──────┘   │ snapshot             │
//! │        ▲                             │          │ decode + cap         │
//! │        │               stream closed │          ▼                      │
//! │        │               or transport  │    ┌────────────┐               │
//! │        │               error         │    │ engine loop│               │
//! │        │                             ▼    └────────────┘               │
//! │        │                       ┌────────────┐                          │
//! │        └────── timer expired ──│  Backoff   │                          │
//! │                                └────────────┘                          │
//! │                                                                         │
//! │  While in Backoff the engine keeps serving the last reconciled view    │
//! │  from the cache; no snapshot means no change, never a wipe.            │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential with Jitter)                            │
//! │  ───────────────────────────────────────────                           │
//! │  Attempt 1: 500ms                                                       │
//! │  Attempt 2: 1s                                                          │
//! │  ...                                                                    │
//! │  Max: 60s                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tally_core::{CollectionSpec, Record};

use crate::remote::{decode_record, AmountCodec, RemoteEvent, RemoteStore};

// =============================================================================
// Listener Events
// =============================================================================

/// Events the listener delivers to the engine loop.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A decoded full-collection snapshot.
    Snapshot {
        collection: String,
        records: Vec<Record>,
    },

    /// The subscription degraded; the listener is backing off before
    /// resubscribing. Informational only - the cached view stays live.
    Degraded { collection: String, reason: String },
}

// =============================================================================
// Listener Configuration
// =============================================================================

/// Configuration for a snapshot listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Initial backoff before the first resubscribe attempt.
    pub initial_backoff: Duration,

    /// Maximum backoff between resubscribe attempts.
    pub max_backoff: Duration,

    /// Maximum rows retained from a single snapshot.
    pub row_cap: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            row_cap: tally_core::DEFAULT_ROW_CAP,
        }
    }
}

// =============================================================================
// Listener Handle
// =============================================================================

/// Handle for stopping a running listener.
#[derive(Clone)]
pub struct ListenerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ListenerHandle {
    /// Signals the listener to stop after its current iteration.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Snapshot Listener
// =============================================================================

/// Background task holding one collection subscription open.
pub struct SnapshotListener {
    store: Arc<dyn RemoteStore>,
    codec: Arc<dyn AmountCodec>,
    spec: CollectionSpec,
    config: ListenerConfig,
    events_tx: mpsc::Sender<ListenerEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SnapshotListener {
    /// Creates a listener and spawns its background task.
    ///
    /// Decoded snapshots arrive on `events_tx`; the returned handle stops
    /// the task.
    pub fn spawn(
        store: Arc<dyn RemoteStore>,
        codec: Arc<dyn AmountCodec>,
        spec: CollectionSpec,
        config: ListenerConfig,
        events_tx: mpsc::Sender<ListenerEvent>,
    ) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let listener = SnapshotListener {
            store,
            codec,
            spec,
            config,
            events_tx,
            shutdown_rx,
        };

        tokio::spawn(listener.run());

        ListenerHandle { shutdown_tx }
    }

    /// Main listener loop: subscribe, drain, back off, repeat.
    async fn run(mut self) {
        info!(collection = %self.spec.name, "Snapshot listener starting");

        let mut backoff = self.create_backoff();

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!(collection = %self.spec.name, "Listener received shutdown signal");
                break;
            }

            match self.store.subscribe_collection(&self.spec).await {
                Ok(event_rx) => {
                    debug!(collection = %self.spec.name, "Subscription established");
                    backoff.reset();

                    if self.drain_subscription(event_rx).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(collection = %self.spec.name, error = %e, "Subscribe failed");
                    self.emit_degraded(e.to_string()).await;
                }
            }

            // Subscription lost or never established - wait before retrying.
            let Some(duration) = backoff.next_backoff() else {
                // Unreachable with max_elapsed_time unset, but never spin.
                warn!(collection = %self.spec.name, "Backoff exhausted");
                break;
            };

            debug!(collection = %self.spec.name, ?duration, "Waiting before resubscribe");

            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = self.shutdown_rx.recv() => {
                    info!(collection = %self.spec.name, "Shutdown during backoff");
                    break;
                }
            }
        }

        info!(collection = %self.spec.name, "Snapshot listener stopped");
    }

    /// Consumes one subscription stream until it degrades or closes.
    ///
    /// Returns true if shutdown was requested.
    async fn drain_subscription(&mut self, mut event_rx: mpsc::Receiver<RemoteEvent>) -> bool {
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(RemoteEvent::Snapshot(raw_records)) => {
                        self.handle_snapshot(raw_records).await;
                    }
                    Some(RemoteEvent::TransportError(reason)) => {
                        warn!(collection = %self.spec.name, %reason, "Subscription degraded");
                        self.emit_degraded(reason).await;
                        return false;
                    }
                    None => {
                        debug!(collection = %self.spec.name, "Subscription stream closed");
                        self.emit_degraded("subscription stream closed".into()).await;
                        return false;
                    }
                },

                _ = self.shutdown_rx.recv() => {
                    return true;
                }
            }
        }
    }

    /// Decodes a raw snapshot, enforces the row cap, and forwards it.
    async fn handle_snapshot(&self, raw_records: Vec<tally_core::RawRecord>) {
        let total = raw_records.len();
        let mut records: Vec<Record> = raw_records
            .iter()
            .map(|raw| decode_record(raw, self.codec.as_ref()))
            .collect();

        if records.len() > self.config.row_cap {
            warn!(
                collection = %self.spec.name,
                total,
                row_cap = self.config.row_cap,
                "Snapshot exceeds row cap, truncating"
            );
            records.truncate(self.config.row_cap);
        }

        debug!(collection = %self.spec.name, rows = records.len(), "Snapshot decoded");

        if self
            .events_tx
            .send(ListenerEvent::Snapshot {
                collection: self.spec.name.clone(),
                records,
            })
            .await
            .is_err()
        {
            // Engine loop is gone; nothing left to feed.
            debug!(collection = %self.spec.name, "Engine event receiver dropped");
        }
    }

    async fn emit_degraded(&self, reason: String) {
        let _ = self
            .events_tx
            .send(ListenerEvent::Degraded {
                collection: self.spec.name.clone(),
                reason,
            })
            .await;
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // Resubscribe forever
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
