use auction_core::{BidResult, TicketId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

struct PendingReceiver {
    receiver: oneshot::Receiver<BidResult>,
    created_at: Instant,
}

/// Maps `ticket_id` to a single-slot result channel. Protected by a
/// short-held mutex on insert/delete; the actual wait happens on the
/// `oneshot::Receiver` outside the lock, so readers never hold the map
/// lock while blocked.
#[derive(Default)]
pub struct TicketMap {
    senders: Mutex<HashMap<TicketId, oneshot::Sender<BidResult>>>,
    receivers: Mutex<HashMap<TicketId, PendingReceiver>>,
}

impl TicketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `ticket_id`. Must be called once, at
    /// intake time, before the request is handed to a worker — so a
    /// publish that races ahead of the first `await_result` call is
    /// still delivered (a `oneshot` buffers its one value regardless
    /// of send/receive order).
    pub fn reserve(&self, ticket_id: TicketId) {
        let (tx, rx) = oneshot::channel();
        self.senders.lock().insert(ticket_id, tx);
        self.receivers
            .lock()
            .insert(ticket_id, PendingReceiver { receiver: rx, created_at: Instant::now() });
    }

    /// Publishes a result, single-shot. If the caller already gave up
    /// on `ticket_id` (timed out, or never called `await_result`), the
    /// send is simply dropped.
    pub fn publish(&self, ticket_id: TicketId, result: BidResult) {
        if let Some(sender) = self.senders.lock().remove(&ticket_id) {
            let _ = sender.send(result);
        }
    }

    /// Waits up to `wait` for the result. Safe to call at most once
    /// per ticket: the receiver is removed from the map on the first
    /// call, so a second call for the same ticket finds nothing and
    /// returns `Error::Timeout` immediately.
    pub async fn await_result(
        &self,
        ticket_id: TicketId,
        wait: Duration,
    ) -> Result<BidResult, auction_core::Error> {
        let pending = self.receivers.lock().remove(&ticket_id);
        let Some(pending) = pending else {
            return Err(auction_core::Error::Timeout);
        };

        match tokio::time::timeout(wait, pending.receiver).await {
            Ok(Ok(result)) => Ok(result),
            // Sender dropped without publishing (panic path already
            // publishes `InternalError`, so this is unexpected) or the
            // wait elapsed.
            Ok(Err(_)) | Err(_) => {
                self.senders.lock().remove(&ticket_id);
                Err(auction_core::Error::Timeout)
            }
        }
    }

    /// Cancels a reservation without publishing — used when intake
    /// itself rejects a request (`QueueFull`) before it ever reaches a
    /// worker, so no orphaned slot waits around for the GC sweep.
    pub fn cancel(&self, ticket_id: TicketId) {
        self.senders.lock().remove(&ticket_id);
        self.receivers.lock().remove(&ticket_id);
    }

    /// Removes any reservation older than `max_age` whose caller never
    /// called `await_result`, reclaiming tickets leaked by client
    /// disconnects. Run on a periodic sweep.
    pub fn sweep(&self, max_age: Duration) {
        let now = Instant::now();
        let mut receivers = self.receivers.lock();
        let stale: Vec<TicketId> = receivers
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.created_at) >= max_age)
            .map(|(id, _)| *id)
            .collect();
        for ticket_id in &stale {
            receivers.remove(ticket_id);
        }
        drop(receivers);
        if !stale.is_empty() {
            let mut senders = self.senders.lock();
            for ticket_id in stale {
                senders.remove(&ticket_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_core::RejectReason;

    fn sample_result(ticket_id: TicketId) -> BidResult {
        BidResult::rejected(ticket_id, RejectReason::BidTooLow, 0)
    }

    #[tokio::test]
    async fn publish_before_await_is_still_delivered() {
        let tickets = TicketMap::new();
        let ticket_id = TicketId::new();
        tickets.reserve(ticket_id);
        tickets.publish(ticket_id, sample_result(ticket_id));

        let result = tickets.await_result(ticket_id, Duration::from_millis(100)).await.unwrap();
        assert_eq!(result.ticket_id, ticket_id);
    }

    #[tokio::test]
    async fn second_await_on_same_ticket_times_out() {
        let tickets = TicketMap::new();
        let ticket_id = TicketId::new();
        tickets.reserve(ticket_id);
        tickets.publish(ticket_id, sample_result(ticket_id));

        tickets.await_result(ticket_id, Duration::from_millis(100)).await.unwrap();
        let second = tickets.await_result(ticket_id, Duration::from_millis(100)).await;
        assert!(matches!(second, Err(auction_core::Error::Timeout)));
    }

    #[tokio::test]
    async fn await_without_publish_times_out() {
        let tickets = TicketMap::new();
        let ticket_id = TicketId::new();
        tickets.reserve(ticket_id);

        let result = tickets.await_result(ticket_id, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(auction_core::Error::Timeout)));
    }

    #[test]
    fn sweep_removes_only_stale_reservations() {
        let tickets = TicketMap::new();
        let old_ticket = TicketId::new();
        tickets.reserve(old_ticket);
        std::thread::sleep(Duration::from_millis(20));
        let fresh_ticket = TicketId::new();
        tickets.reserve(fresh_ticket);

        tickets.sweep(Duration::from_millis(10));

        assert!(tickets.receivers.lock().contains_key(&fresh_ticket));
        assert!(!tickets.receivers.lock().contains_key(&old_ticket));
    }
}
