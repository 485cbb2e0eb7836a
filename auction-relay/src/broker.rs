use auction_core::{AuctionId, BidEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

const SUBSCRIBER_INBOX_SIZE: usize = 100;

pub type SubscriberId = u64;

/// Snapshot for `Broker::stats()`.
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    pub total_connections: usize,
    pub per_auction_counts: HashMap<AuctionId, usize>,
    pub dropped_events: u64,
}

struct Subscription {
    id: SubscriberId,
    sender: mpsc::Sender<Arc<BidEvent>>,
}

#[derive(Default)]
struct SubscriptionMap {
    by_auction: HashMap<AuctionId, Vec<Subscription>>,
}

/// Fans out `BidEvent`s from a single producer (the bid processor) to
/// per-auction subscriber sets, without blocking the publisher and
/// without one slow subscriber affecting any other.
///
/// Built on a single-consumer dispatch loop reading off an internal
/// `mpsc`, fanning out to a per-subscriber bounded `mpsc` so a lagging
/// subscriber's backlog cannot force delivery to be skipped for other
/// subscribers of the same or a different auction — a plain
/// `tokio::sync::broadcast::Sender` would not give that isolation,
/// since a lagging receiver there affects the shared ring buffer all
/// receivers read from.
pub struct Broker {
    subscriptions: RwLock<SubscriptionMap>,
    next_subscriber_id: AtomicU64,
    events_tx: mpsc::Sender<BidEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl Broker {
    pub fn new(queue_size: usize) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(queue_size);
        let broker = Arc::new(Self {
            subscriptions: RwLock::new(SubscriptionMap::default()),
            next_subscriber_id: AtomicU64::new(0),
            events_tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        });
        broker.clone().spawn_dispatch_loop(events_rx);
        broker
    }

    /// Single-producer entry point. Never blocks the caller: if the
    /// broker-wide queue is saturated the event is dropped and counted
    /// rather than allowed to block the processor.
    pub fn broadcast(&self, event: BidEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(_) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!("broker event queue full; dropping event");
            }
        }
    }

    pub fn subscribe(self: &Arc<Self>, auction_id: AuctionId) -> Subscriber {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_INBOX_SIZE);
        self.subscriptions
            .write()
            .by_auction
            .entry(auction_id)
            .or_default()
            .push(Subscription { id, sender: tx });
        Subscriber { id, auction_id, broker: self.clone(), inbox: rx }
    }

    pub fn unsubscribe(&self, auction_id: AuctionId, subscriber_id: SubscriberId) {
        let mut subscriptions = self.subscriptions.write();
        if let Some(subscribers) = subscriptions.by_auction.get_mut(&auction_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                subscriptions.by_auction.remove(&auction_id);
            }
        }
    }

    pub fn stats(&self) -> BrokerStats {
        let subscriptions = self.subscriptions.read();
        let per_auction_counts = subscriptions
            .by_auction
            .iter()
            .map(|(id, subs)| (*id, subs.len()))
            .collect();
        let total_connections = subscriptions.by_auction.values().map(Vec::len).sum();
        BrokerStats {
            total_connections,
            per_auction_counts,
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }

    fn spawn_dispatch_loop(self: Arc<Self>, mut events_rx: mpsc::Receiver<BidEvent>) {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                // Serialize the event once, deliver the same `Arc` to
                // every subscriber — not once per subscriber.
                let event = Arc::new(event);
                let subscriptions = self.subscriptions.read();
                if let Some(subscribers) = subscriptions.by_auction.get(&event.auction_id) {
                    for subscriber in subscribers {
                        // Non-blocking: a full subscriber inbox just
                        // skips that one delivery (slow-consumer
                        // isolation), never the publisher.
                        if subscriber.sender.try_send(event.clone()).is_err() {
                            trace!(subscriber_id = subscriber.id, "subscriber inbox full; skipping delivery");
                        }
                    }
                }
            }
        });
    }
}

/// A live push-stream connection bound to a single auction for the
/// duration of its lifetime. Dropping it (or calling `unsubscribe`
/// explicitly) removes it from the broker's subscription map; the
/// broker discards any further messages for it immediately.
pub struct Subscriber {
    id: SubscriberId,
    auction_id: AuctionId,
    broker: Arc<Broker>,
    inbox: mpsc::Receiver<Arc<BidEvent>>,
}

impl Subscriber {
    pub async fn recv(&mut self) -> Option<Arc<BidEvent>> {
        self.inbox.recv().await
    }

    pub fn auction_id(&self) -> AuctionId {
        self.auction_id
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.auction_id, self.id);
    }
}
