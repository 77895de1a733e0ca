//! # Ledger Engine
//!
//! Main orchestrator. Owns the cache, the tombstone registries, and the
//! notifier; routes commands from handles and snapshots from listeners
//! through a single event loop.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LedgerEngine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        LedgerEngine                              │  │
//! │  │                                                                  │  │
//! │  │  • Spawns one SnapshotListener per collection                    │  │
//! │  │  • Applies optimistic writes to the cache, publishes, then       │  │
//! │  │    races the remote call against the write deadline              │  │
//! │  │  • Reconciles every incoming snapshot against cache + tombstones │  │
//! │  │  • Fans reconciled views out through the ChannelNotifier         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │SnapshotListener│  │  CacheStore +  │  │   ChannelNotifier      │    │
//! │  │  (per          │  │  Tombstone     │  │                        │    │
//! │  │  collection)   │  │  Registries    │  │ Clone-per-subscriber   │    │
//! │  │                │  │                │  │ fanout with replay     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  WRITE PATH (add/delete):                                              │
//! │  ────────────────────────                                              │
//! │  validate ► mutate cache ► publish view ► race remote op vs deadline   │
//! │                                            │                            │
//! │                    caller's reply ◄────────┘                            │
//! │                                                                         │
//! │  A failed or timed-out remote op NEVER rolls the local write back;     │
//! │  the next snapshot reconciles either way.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tally_core::{validation, CollectionSpec, CoreError, Record, ValidationError};

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::deadline::DeadlineExecutor;
use crate::error::{EngineError, EngineResult};
use crate::listener::{ListenerConfig, ListenerEvent, ListenerHandle, SnapshotListener};
use crate::notify::{ChannelNotifier, SubscriptionId};
use crate::reconcile::{reconcile, sort_rows};
use crate::remote::{encode_record, AmountCodec, RemoteStore};
use crate::tombstone::TombstoneRegistry;

// =============================================================================
// Engine Status
// =============================================================================

/// Point-in-time engine status for external queries.
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    /// Number of managed collections.
    pub collections: usize,

    /// Collections whose subscription is currently degraded.
    pub degraded_collections: Vec<String>,

    /// Total pending tombstones across all collections.
    pub pending_tombstones: usize,

    /// Last error reported by a listener (if any).
    pub last_error: Option<String>,
}

// =============================================================================
// Commands
// =============================================================================

/// Commands routed from handles into the engine loop.
enum EngineCommand {
    AddRecord {
        collection: String,
        record: Record,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    DeleteRecord {
        collection: String,
        id: String,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    GetRecord {
        collection: String,
        id: String,
        reply: oneshot::Sender<EngineResult<Option<Record>>>,
    },
    Subscribe {
        collection: String,
        owner_filter: Option<String>,
        reply: oneshot::Sender<
            EngineResult<(SubscriptionId, mpsc::UnboundedReceiver<Vec<Record>>)>,
        >,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

// =============================================================================
// Ledger Handle
// =============================================================================

/// Handle for interacting with a running engine. Cheap to clone.
#[derive(Clone)]
pub struct LedgerHandle {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl LedgerHandle {
    /// Adds a record to a collection.
    ///
    /// The record becomes visible to subscribers immediately; the returned
    /// result reflects the REMOTE outcome (including `DeadlineExceeded`)
    /// and a failure does not undo the local write.
    pub async fn add_record(&self, collection: &str, record: Record) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AddRecord {
            collection: collection.to_string(),
            record,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Deletes a record by id.
    ///
    /// The row disappears from subscriber views immediately and a
    /// tombstone guards against stale-snapshot resurrection; the returned
    /// result reflects the remote outcome.
    pub async fn delete_record(&self, collection: &str, id: &str) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::DeleteRecord {
            collection: collection.to_string(),
            id: id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Fetches a single record, cache first.
    ///
    /// A cache miss falls through to a remote read under the write
    /// deadline; remote failures degrade to `None` rather than erroring,
    /// so the read path never fails on transport problems.
    pub async fn get_record(
        &self,
        collection: &str,
        id: &str,
    ) -> EngineResult<Option<Record>> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::GetRecord {
            collection: collection.to_string(),
            id: id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Subscribes to a collection's reconciled views.
    pub async fn subscribe(
        &self,
        collection: &str,
    ) -> EngineResult<(SubscriptionId, mpsc::UnboundedReceiver<Vec<Record>>)> {
        self.subscribe_filtered(collection, None).await
    }

    /// Subscribes to a collection, seeing only one owner's rows.
    pub async fn subscribe_scoped(
        &self,
        collection: &str,
        owner: &str,
    ) -> EngineResult<(SubscriptionId, mpsc::UnboundedReceiver<Vec<Record>>)> {
        self.subscribe_filtered(collection, Some(owner.to_string()))
            .await
    }

    async fn subscribe_filtered(
        &self,
        collection: &str,
        owner_filter: Option<String>,
    ) -> EngineResult<(SubscriptionId, mpsc::UnboundedReceiver<Vec<Record>>)> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Subscribe {
            collection: collection.to_string(),
            owner_filter,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Cancels a subscription.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> EngineResult<()> {
        self.send(EngineCommand::Unsubscribe { id }).await
    }

    /// Returns the current engine status.
    pub async fn status(&self) -> EngineResult<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ShuttingDown)
    }

    /// Stops the engine and its listeners.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, command: EngineCommand) -> EngineResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }
}

// =============================================================================
// Ledger Engine
// =============================================================================

/// Per-collection state owned by the engine loop.
struct CollectionState {
    spec: CollectionSpec,
    tombstones: TombstoneRegistry,
}

/// The reconciliation engine. Constructed once per process via [`spawn`].
///
/// [`spawn`]: LedgerEngine::spawn
pub struct LedgerEngine {
    store: Arc<dyn RemoteStore>,
    codec: Arc<dyn AmountCodec>,
    deadline: DeadlineExecutor,

    collections: HashMap<String, CollectionState>,
    cache: CacheStore,
    notifier: ChannelNotifier,
    status: EngineStatus,
    degraded: HashSet<String>,

    command_rx: mpsc::Receiver<EngineCommand>,
    events_rx: mpsc::Receiver<ListenerEvent>,
    listeners: Vec<ListenerHandle>,
}

impl LedgerEngine {
    /// Spawns the engine and one snapshot listener per collection.
    ///
    /// Returns the handle used for all further interaction; the engine
    /// itself runs until [`LedgerHandle::shutdown`] or until every handle
    /// clone is dropped.
    pub fn spawn(
        config: &EngineConfig,
        store: Arc<dyn RemoteStore>,
        codec: Arc<dyn AmountCodec>,
        specs: Vec<CollectionSpec>,
    ) -> LedgerHandle {
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.channels.event_capacity);

        let mut collections = HashMap::new();
        let mut listeners = Vec::new();

        for spec in specs {
            // The configured cap acts as a ceiling over per-collection caps.
            let listener_config = ListenerConfig {
                initial_backoff: config.listener.initial_backoff(),
                max_backoff: config.listener.max_backoff(),
                row_cap: spec.row_cap.min(config.listener.row_cap),
            };
            listeners.push(SnapshotListener::spawn(
                store.clone(),
                codec.clone(),
                spec.clone(),
                listener_config,
                events_tx.clone(),
            ));
            collections.insert(
                spec.name.clone(),
                CollectionState {
                    spec,
                    tombstones: TombstoneRegistry::new(),
                },
            );
        }

        let status = EngineStatus {
            collections: collections.len(),
            ..Default::default()
        };

        let engine = LedgerEngine {
            store,
            codec,
            deadline: DeadlineExecutor::new(config.write.deadline()),
            collections,
            cache: CacheStore::new(),
            notifier: ChannelNotifier::new(),
            status,
            degraded: HashSet::new(),
            command_rx,
            events_rx,
            listeners,
        };

        tokio::spawn(engine.run());

        LedgerHandle { command_tx }
    }

    /// Main engine loop.
    async fn run(mut self) {
        info!(collections = self.collections.len(), "Ledger engine starting");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_listener_event(event);
                }
            }
        }

        for listener in &self.listeners {
            listener.shutdown().await;
        }

        info!("Ledger engine stopped");
    }

    // =========================================================================
    // Command Handling
    // =========================================================================

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::AddRecord {
                collection,
                record,
                reply,
            } => {
                if let Err(e) = self.apply_add(&collection, record.clone()) {
                    let _ = reply.send(Err(e));
                    return;
                }
                self.dispatch_remote_write(collection, record, reply);
            }

            EngineCommand::DeleteRecord {
                collection,
                id,
                reply,
            } => {
                if let Err(e) = self.apply_delete(&collection, &id) {
                    let _ = reply.send(Err(e));
                    return;
                }
                self.dispatch_remote_delete(collection, id, reply);
            }

            EngineCommand::GetRecord {
                collection,
                id,
                reply,
            } => self.handle_get_record(collection, id, reply),

            EngineCommand::Subscribe {
                collection,
                owner_filter,
                reply,
            } => {
                let result = if self.collections.contains_key(&collection) {
                    Ok(self.notifier.subscribe(&collection, owner_filter))
                } else {
                    Err(CoreError::UnknownCollection(collection).into())
                };
                let _ = reply.send(result);
            }

            EngineCommand::Unsubscribe { id } => {
                self.notifier.unsubscribe(id);
            }

            EngineCommand::Status { reply } => {
                let mut status = self.status.clone();
                status.degraded_collections = self.degraded.iter().cloned().collect();
                status.degraded_collections.sort();
                status.pending_tombstones = self
                    .collections
                    .values()
                    .map(|c| c.tombstones.len())
                    .sum();
                let _ = reply.send(status);
            }

            // Routed before dispatch in run().
            EngineCommand::Shutdown => {}
        }
    }

    /// Validates and applies an optimistic add, publishing the new view.
    fn apply_add(&mut self, collection: &str, record: Record) -> EngineResult<()> {
        let state = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| CoreError::UnknownCollection(collection.to_string()))?;

        validation::validate_write(collection, &record, state.spec.merge_policy)
            .map_err(EngineError::from)?;

        let key = record.natural_key();
        if state.spec.dedup_by_name {
            // Re-adding a name with a pending deletion cancels the key
            // half of the tombstone so the create is not suppressed.
            state.tombstones.clear_key(&key);

            if self
                .cache
                .rows(collection)
                .iter()
                .any(|r| r.natural_key() == key)
            {
                return Err(ValidationError::Duplicate {
                    field: "name".to_string(),
                    value: record.name,
                }
                .into());
            }
        }

        debug!(collection, record_id = %record.id, "Optimistic add");
        self.cache.append(collection, record);
        self.publish_view(collection);
        Ok(())
    }

    /// Applies an optimistic delete: tombstone, drop from cache, publish.
    fn apply_delete(&mut self, collection: &str, id: &str) -> EngineResult<()> {
        validation::validate_collection_name(collection).map_err(CoreError::from)?;

        let state = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| CoreError::UnknownCollection(collection.to_string()))?;

        let Some(record) = self.cache.rows(collection).iter().find(|r| r.id == id) else {
            return Err(CoreError::RecordNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }
            .into());
        };

        // Record the natural key only where names are unique; elsewhere a
        // key tombstone would suppress unrelated same-named rows.
        let key = if state.spec.dedup_by_name {
            record.natural_key()
        } else {
            String::new()
        };

        debug!(collection, record_id = %id, "Optimistic delete");
        state.tombstones.mark_deleted(id, key);
        self.cache.remove(collection, id);
        self.publish_view(collection);
        Ok(())
    }

    /// Serves a read from the cache, falling back to a remote lookup.
    ///
    /// Transport and deadline failures on the fallback degrade to `None`;
    /// the read path never surfaces remote errors.
    fn handle_get_record(
        &self,
        collection: String,
        id: String,
        reply: oneshot::Sender<EngineResult<Option<Record>>>,
    ) {
        if !self.collections.contains_key(&collection) {
            let _ = reply.send(Err(CoreError::UnknownCollection(collection).into()));
            return;
        }

        if let Some(record) = self.cache.rows(&collection).iter().find(|r| r.id == id) {
            let _ = reply.send(Ok(Some(record.clone())));
            return;
        }

        let store = self.store.clone();
        let codec = self.codec.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let result = deadline
                .execute(async move {
                    let raw = store.read_record(&collection, &id).await?;
                    Ok(raw.map(|raw| crate::remote::decode_record(&raw, codec.as_ref())))
                })
                .await;

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    debug!(error = %e, "Remote read failed, degrading to absent");
                    None
                }
            };
            let _ = reply.send(Ok(record));
        });
    }

    /// Races the remote write against the deadline; the caller's reply
    /// resolves with the remote outcome while the view stays as published.
    fn dispatch_remote_write(
        &self,
        collection: String,
        record: Record,
        reply: oneshot::Sender<EngineResult<()>>,
    ) {
        let raw = encode_record(&record, self.codec.as_ref());
        let store = self.store.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let result = deadline
                .execute(async move { store.write_record(&collection, &raw).await })
                .await;
            if let Err(ref e) = result {
                warn!(error = %e, "Remote write failed, local view retained");
            }
            let _ = reply.send(result);
        });
    }

    fn dispatch_remote_delete(
        &self,
        collection: String,
        id: String,
        reply: oneshot::Sender<EngineResult<()>>,
    ) {
        let store = self.store.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let result = deadline
                .execute(async move { store.delete_record(&collection, &id).await })
                .await;
            if let Err(ref e) = result {
                warn!(error = %e, "Remote delete failed, tombstone retained");
            }
            let _ = reply.send(result);
        });
    }

    // =========================================================================
    // Snapshot Handling
    // =========================================================================

    fn handle_listener_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Snapshot {
                collection,
                records,
            } => self.handle_snapshot(&collection, records),

            ListenerEvent::Degraded { collection, reason } => {
                self.degraded.insert(collection);
                self.status.last_error = Some(reason);
            }
        }
    }

    /// Reconciles a snapshot into the cache and publishes the result.
    fn handle_snapshot(&mut self, collection: &str, records: Vec<Record>) {
        let Some(state) = self.collections.get_mut(collection) else {
            warn!(collection, "Snapshot for unmanaged collection dropped");
            return;
        };

        // A snapshot proves the subscription recovered; once nothing is
        // degraded anymore the last reported error is stale.
        self.degraded.remove(collection);
        if self.degraded.is_empty() {
            self.status.last_error = None;
        }

        let snapshot_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

        let merged = reconcile(
            &state.spec,
            records.clone(),
            self.cache.rows(collection),
            &state.tombstones,
        );

        // Retire tombstones the remote has caught up with. Runs AFTER the
        // merge so this snapshot is still filtered through them.
        state.tombstones.confirm_absent(&snapshot_ids);

        debug!(collection, rows = merged.len(), "Snapshot reconciled");
        self.cache.replace(collection, merged);
        self.publish_view(collection);
    }

    /// Publishes the current cached view of a collection, sorted into the
    /// collection's natural order.
    fn publish_view(&mut self, collection: &str) {
        let Some(state) = self.collections.get(collection) else {
            return;
        };
        let mut view = self.cache.rows(collection).to_vec();
        sort_rows(&mut view, state.spec.sort_order);
        self.notifier.publish(collection, view);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;
    use std::time::Duration;
    use tally_core::{Money, RawRecord};

    use crate::remote::{PlainCodec, RemoteEvent};

    /// Remote store stub: records writes/deletes, hands out one
    /// subscription stream per collection, optionally stalls writes.
    struct StubStore {
        subscriptions: Mutex<HashMap<String, Vec<mpsc::Receiver<RemoteEvent>>>>,
        writes: Mutex<Vec<(String, RawRecord)>>,
        deletes: Mutex<Vec<(String, String)>>,
        remote_records: Mutex<HashMap<String, RawRecord>>,
        write_delay: Option<Duration>,
    }

    impl StubStore {
        fn new() -> Self {
            StubStore {
                subscriptions: Mutex::new(HashMap::new()),
                writes: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
                remote_records: Mutex::new(HashMap::new()),
                write_delay: None,
            }
        }

        fn with_write_delay(delay: Duration) -> Self {
            StubStore {
                write_delay: Some(delay),
                ..Self::new()
            }
        }

        /// Registers a scripted subscription stream for a collection.
        fn script_subscription(&self, collection: &str) -> mpsc::Sender<RemoteEvent> {
            let (tx, rx) = mpsc::channel(8);
            self.subscriptions
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .push(rx);
            tx
        }
    }

    impl RemoteStore for StubStore {
        fn subscribe_collection<'a>(
            &'a self,
            spec: &'a CollectionSpec,
        ) -> BoxFuture<'a, EngineResult<mpsc::Receiver<RemoteEvent>>> {
            Box::pin(async move {
                self.subscriptions
                    .lock()
                    .unwrap()
                    .get_mut(&spec.name)
                    .and_then(|streams| streams.pop())
                    .ok_or_else(|| EngineError::SubscribeFailed {
                        collection: spec.name.clone(),
                        reason: "no scripted stream".into(),
                    })
            })
        }

        fn write_record<'a>(
            &'a self,
            collection: &'a str,
            record: &'a RawRecord,
        ) -> BoxFuture<'a, EngineResult<()>> {
            Box::pin(async move {
                if let Some(delay) = self.write_delay {
                    tokio::time::sleep(delay).await;
                }
                self.writes
                    .lock()
                    .unwrap()
                    .push((collection.to_string(), record.clone()));
                Ok(())
            })
        }

        fn delete_record<'a>(
            &'a self,
            collection: &'a str,
            id: &'a str,
        ) -> BoxFuture<'a, EngineResult<()>> {
            Box::pin(async move {
                self.deletes
                    .lock()
                    .unwrap()
                    .push((collection.to_string(), id.to_string()));
                Ok(())
            })
        }

        fn read_record<'a>(
            &'a self,
            _collection: &'a str,
            id: &'a str,
        ) -> BoxFuture<'a, EngineResult<Option<RawRecord>>> {
            Box::pin(async move { Ok(self.remote_records.lock().unwrap().get(id).cloned()) })
        }
    }

    fn categories_spec() -> CollectionSpec {
        CollectionSpec::new("categories").sorted_by_name().dedup_by_name()
    }

    fn spawn_engine(store: Arc<StubStore>, specs: Vec<CollectionSpec>) -> LedgerHandle {
        let config = EngineConfig::default();
        LedgerEngine::spawn(&config, store, Arc::new(PlainCodec), specs)
    }

    fn raw(id: &str, name: &str) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            owner_id: None,
            name: name.to_string(),
            amount: "0".to_string(),
            occurred_at: chrono::Utc::now().to_rfc3339(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_is_visible_before_remote_confirms() {
        // Remote writes take a full minute; the deadline is 10s.
        let store = Arc::new(StubStore::with_write_delay(Duration::from_secs(60)));
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let (_id, mut views) = handle.subscribe("categories").await.unwrap();

        let record = Record::new("Food", Money::zero());
        let result = handle.add_record("categories", record.clone()).await;

        // The caller sees the deadline, but the view already carried the
        // optimistic row and it is not rolled back.
        assert!(matches!(result, Err(EngineError::DeadlineExceeded(_))));
        let view = views.recv().await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, record.id);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_reaches_remote_store() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        handle
            .add_record("categories", Record::new("Food", Money::from_cents(100)))
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "categories");
        assert_eq!(writes[0].1.name, "Food");
        assert_eq!(writes[0].1.amount, "100");
        drop(writes);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_suppresses_stale_snapshot() {
        let store = Arc::new(StubStore::new());
        let snapshot_tx = store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        // Remote already knows c1 and c2.
        snapshot_tx
            .send(RemoteEvent::Snapshot(vec![raw("c1", "Food"), raw("c2", "Transport")]))
            .await
            .unwrap();

        let (_id, mut views) = handle.subscribe("categories").await.unwrap();
        let mut view = views.recv().await.unwrap();
        while view.len() < 2 {
            view = views.recv().await.unwrap();
        }

        handle.delete_record("categories", "c1").await.unwrap();

        // Deletion is immediately visible.
        let view = views.recv().await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "c2");

        // A STALE snapshot still carrying c1 must not resurrect it.
        snapshot_tx
            .send(RemoteEvent::Snapshot(vec![raw("c1", "Food"), raw("c2", "Transport")]))
            .await
            .unwrap();

        let view = views.recv().await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "c2");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_cancels_tombstone_key() {
        let store = Arc::new(StubStore::new());
        let snapshot_tx = store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        snapshot_tx
            .send(RemoteEvent::Snapshot(vec![raw("c1", "Food")]))
            .await
            .unwrap();

        let (_id, mut views) = handle.subscribe("categories").await.unwrap();
        let mut view = views.recv().await.unwrap();
        while view.is_empty() {
            view = views.recv().await.unwrap();
        }

        // Delete "Food", then re-add it before the remote confirms.
        handle.delete_record("categories", "c1").await.unwrap();
        let readd = Record::new("Food", Money::zero());
        handle.add_record("categories", readd.clone()).await.unwrap();

        // Stale snapshot still carries the OLD c1: the id tombstone keeps
        // suppressing it while the re-added row stays visible.
        snapshot_tx
            .send(RemoteEvent::Snapshot(vec![raw("c1", "Food")]))
            .await
            .unwrap();

        let view = views.recv().await.unwrap(); // delete published
        assert!(view.is_empty());
        let view = views.recv().await.unwrap(); // re-add published
        assert_eq!(view.len(), 1);
        let view = views.recv().await.unwrap(); // stale snapshot reconciled
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, readd.id);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_name_rejected_on_dedup_collection() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        handle
            .add_record("categories", Record::new("Food", Money::zero()))
            .await
            .unwrap();

        let result = handle
            .add_record("categories", Record::new("  FOOD ", Money::zero()))
            .await;

        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::Validation(
                ValidationError::Duplicate { .. }
            )))
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_collection_is_rejected() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let result = handle
            .add_record("nonexistent", Record::new("X", Money::zero()))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::UnknownCollection(_)))
        ));

        let result = handle.subscribe("nonexistent").await;
        assert!(result.is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_without_owner_on_scoped_collection_is_rejected() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("transactions");
        let spec = CollectionSpec::new("transactions").owner_scoped();
        let handle = spawn_engine(store.clone(), vec![spec]);

        let result = handle
            .add_record("transactions", Record::new("Lunch", Money::from_cents(-1_200)))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::MissingOwner { .. }))
        ));

        // The rejected record never became a pending write.
        assert!(store.writes.lock().unwrap().is_empty());

        let owned = Record::new("Lunch", Money::from_cents(-1_200)).with_owner("alice");
        handle.add_record("transactions", owned).await.unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_collection_name_is_rejected() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let result = handle
            .add_record("Not A Collection", Record::new("X", Money::zero()))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::UnknownCollection(_)))
        ));

        let result = handle.delete_record("Not A Collection", "c1").await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::Validation(
                ValidationError::InvalidFormat { .. }
            )))
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_of_unknown_id_is_not_found() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let result = handle.delete_record("categories", "ghost").await;
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::RecordNotFound { .. }))
        ));

        // No tombstone was recorded and no remote delete was issued.
        let status = handle.status().await.unwrap();
        assert_eq!(status.pending_tombstones, 0);
        assert!(store.deletes.lock().unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_record_serves_cache_hit() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let record = Record::new("Food", Money::from_cents(500));
        handle.add_record("categories", record.clone()).await.unwrap();

        let fetched = handle.get_record("categories", &record.id).await.unwrap();
        assert_eq!(fetched.unwrap().name, "Food");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_record_falls_back_to_remote() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        store
            .remote_records
            .lock()
            .unwrap()
            .insert("c9".to_string(), raw("c9", "Archived"));
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        let fetched = handle.get_record("categories", "c9").await.unwrap();
        assert_eq!(fetched.unwrap().name, "Archived");

        let absent = handle.get_record("categories", "missing").await.unwrap();
        assert!(absent.is_none());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_recovery_clears_last_error() {
        let store = Arc::new(StubStore::new());
        let failing_tx = store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        failing_tx
            .send(RemoteEvent::TransportError("connection reset".to_string()))
            .await
            .unwrap();

        // Resubscribe attempts fail (nothing scripted yet), so the
        // collection stays degraded until recovery is scripted below.
        let mut status = handle.status().await.unwrap();
        while status.degraded_collections.is_empty() {
            status = handle.status().await.unwrap();
        }
        assert!(status.last_error.is_some());

        let recovery_tx = store.script_subscription("categories");
        recovery_tx
            .send(RemoteEvent::Snapshot(vec![raw("c1", "Food")]))
            .await
            .unwrap();

        let mut status = handle.status().await.unwrap();
        while !status.degraded_collections.is_empty() {
            status = handle.status().await.unwrap();
        }
        assert!(status.last_error.is_none());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_tombstones() {
        let store = Arc::new(StubStore::new());
        store.script_subscription("categories");
        let handle = spawn_engine(store.clone(), vec![categories_spec()]);

        handle
            .add_record("categories", Record::new("Food", Money::zero()))
            .await
            .unwrap();
        let view_id = {
            let writes = store.writes.lock().unwrap();
            writes[0].1.id.clone()
        };
        handle.delete_record("categories", &view_id).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.collections, 1);
        assert_eq!(status.pending_tombstones, 1);

        handle.shutdown().await.unwrap();
    }
}
