use crate::broker::Broker;
use crate::dispatch::Counters;
use crate::processor::Processor;
use crate::storage::AuctionStore;
use crate::ticket::TicketMap;
use auction_core::{BidRequest, BidResult, RejectReason};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// A single auction's serialization point: bids for one `auction_id`
/// are processed strictly in arrival order, one at a time, while
/// different auctions' workers run fully in parallel. A single task
/// drains an `mpsc::Receiver<BidRequest>` in a loop, invoking the
/// processor synchronously before accepting the next request.
pub struct Worker {
    inbox: mpsc::Sender<BidRequest>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<S: AuctionStore + ?Sized + 'static>(
        inbox_size: usize,
        processor: Arc<Processor<S>>,
        tickets: Arc<TicketMap>,
        broker: Arc<Broker>,
        counters: Arc<Counters>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(inbox_size);
        let handle = tokio::spawn(Self::run(rx, processor, tickets, broker, counters));
        Self { inbox: tx, handle }
    }

    /// A cheap clone of the inbox handle, used by the dispatcher so the
    /// workers map's mutex never needs to be held across an `.await`.
    pub fn sender(&self) -> mpsc::Sender<BidRequest> {
        self.inbox.clone()
    }

    /// A worker whose task has exited (panicked, or its inbox was
    /// dropped) is dead; the dispatch engine replaces it lazily on the
    /// next bid for that auction rather than sending into it.
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Consumes the worker, closing its inbox and waiting for it to
    /// drain and exit — the graceful half of `stop()`.
    pub async fn shutdown(self) {
        drop(self.inbox);
        let _ = self.handle.await;
    }

    async fn run<S: AuctionStore + ?Sized + 'static>(
        mut inbox: mpsc::Receiver<BidRequest>,
        processor: Arc<Processor<S>>,
        tickets: Arc<TicketMap>,
        broker: Arc<Broker>,
        counters: Arc<Counters>,
    ) {
        while let Some(request) = inbox.recv().await {
            let ticket_id = request.ticket_id;
            trace!(%ticket_id, auction_id = %request.auction_id, "worker processing bid");

            // Panic isolation: a panic inside `process` fails only
            // this ticket. Caught here, rather than left to unwind the
            // task, so the worker survives and keeps draining its inbox
            // for the same auction instead of forcing the dispatcher to
            // spawn a fresh one for every subsequent bid.
            let outcome =
                AssertUnwindSafe(processor.process(&request)).catch_unwind().await;

            let (result, events) = match outcome {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let panic_message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%ticket_id, auction_id = %request.auction_id, %panic_message, "processor panicked");
                    (BidResult::error(ticket_id, RejectReason::InternalError, 0), Vec::new())
                }
            };

            counters.record(result.retries);
            tickets.publish(ticket_id, result);
            for event in events {
                broker.broadcast(event);
            }
        }
    }
}
