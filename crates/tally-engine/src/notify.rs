//! # View Notifier
//!
//! Fans reconciled collection views out to an arbitrary number of
//! observers, each on its own channel.
//!
//! ## Delivery Guarantees
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        View Notifier Guarantees                         │
//! │                                                                         │
//! │  publish("categories", view)                                            │
//! │       │                                                                 │
//! │       ├──► subscriber 1  (own clone of the view)                        │
//! │       ├──► subscriber 2  (own clone, delivered after subscriber 1)      │
//! │       └──► subscriber 3  (owner-filtered clone)                         │
//! │                                                                         │
//! │  • Every subscriber receives its OWN copy; observers can never see     │
//! │    each other's mutations.                                              │
//! │  • Delivery follows subscription order within one publish call.        │
//! │  • A LATE subscriber immediately receives the last published view      │
//! │    for its collection, so it never starts blank when data exists.      │
//! │  • A subscriber with an owner filter only ever sees that owner's       │
//! │    rows, regardless of what the cache holds for other owners.          │
//! │  • Closed receivers are pruned on the next publish.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use tally_core::Record;

// =============================================================================
// Subscription Types
// =============================================================================

/// Opaque identifier for an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One observer's registration.
struct Subscription {
    id: SubscriptionId,
    collection: String,
    owner_filter: Option<String>,
    tx: mpsc::UnboundedSender<Vec<Record>>,
}

// =============================================================================
// Channel Notifier
// =============================================================================

/// Multi-observer fanout of reconciled views.
///
/// Owned by the engine loop; all methods are synchronous because delivery
/// goes through unbounded channels and never blocks the publisher.
#[derive(Default)]
pub struct ChannelNotifier {
    next_id: u64,
    subscribers: Vec<Subscription>,
    last_views: HashMap<String, Vec<Record>>,
}

impl ChannelNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for a collection.
    ///
    /// If a view was already published for the collection, it is replayed
    /// to the new subscriber immediately. With an `owner_filter`, the
    /// subscriber only receives rows belonging to that owner.
    pub fn subscribe(
        &mut self,
        collection: &str,
        owner_filter: Option<String>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Vec<Record>>) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();

        // Late-subscriber replay: catch up before joining the fanout.
        if let Some(view) = self.last_views.get(collection) {
            let _ = tx.send(filter_rows(view, owner_filter.as_deref()));
        }

        debug!(
            collection,
            subscription_id = id.0,
            owner = owner_filter.as_deref().unwrap_or("-"),
            "Observer subscribed"
        );

        self.subscribers.push(Subscription {
            id,
            collection: collection.to_string(),
            owner_filter,
            tx,
        });

        (id, rx)
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|s| s.id != id);
    }

    /// Publishes a reconciled view to every subscriber of the collection,
    /// in subscription order, and retains it for late subscribers.
    pub fn publish(&mut self, collection: &str, view: Vec<Record>) {
        self.subscribers.retain(|sub| {
            if sub.collection != collection {
                return !sub.tx.is_closed();
            }
            sub.tx
                .send(filter_rows(&view, sub.owner_filter.as_deref()))
                .is_ok()
        });

        self.last_views.insert(collection.to_string(), view);
    }

    /// Returns the last published view for a collection, if any.
    pub fn last_view(&self, collection: &str) -> Option<&[Record]> {
        self.last_views.get(collection).map(Vec::as_slice)
    }

    /// Returns the number of live subscriptions for a collection.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.collection == collection)
            .count()
    }
}

/// Clones a view through an optional owner filter.
fn filter_rows(view: &[Record], owner: Option<&str>) -> Vec<Record> {
    match owner {
        None => view.to_vec(),
        Some(owner) => view
            .iter()
            .filter(|r| r.owner_id.as_deref() == Some(owner))
            .cloned()
            .collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
