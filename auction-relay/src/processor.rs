use crate::storage::{AuctionStore, BidUpdate, Extension, StoreError};
use auction_core::{
    config::Config, Auction, BidEvent, BidEventKind, BidRequest, BidResult, RejectReason,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Outcome of one attempt through the OCC loop. `Retry` never escapes
/// `Processor::process`; it only drives the internal retry loop.
enum Attempt {
    Accepted { result: BidResult, events: Vec<BidEvent> },
    Terminal(BidResult),
    Retry,
}

/// The bid processor: a pure function of `(request, auction row)`
/// repeated under an OCC retry budget. Stateless aside from the store
/// handle and config it was constructed with — every call is
/// independent. Even though the worker already serializes requests
/// per auction, optimistic concurrency control is still required here
/// because storage writes can race with concurrent writers outside
/// this process.
pub struct Processor<S: ?Sized> {
    store: Arc<S>,
    config: Arc<Config>,
}

impl<S: AuctionStore + ?Sized> Processor<S> {
    pub fn new(store: Arc<S>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    #[tracing::instrument(skip(self, request), fields(auction_id = %request.auction_id, ticket_id = %request.ticket_id))]
    pub async fn process(&self, request: &BidRequest) -> (BidResult, Vec<BidEvent>) {
        let mut retries = 0u32;
        loop {
            match self.attempt(request, retries).await {
                Attempt::Accepted { result, events } => return (result, events),
                Attempt::Terminal(result) => return (result, Vec::new()),
                Attempt::Retry => {
                    if retries >= self.config.max_retries {
                        warn!(%retries, "exhausted retry budget");
                        let result = BidResult::rejected(
                            request.ticket_id,
                            RejectReason::VersionConflict,
                            retries,
                        );
                        return (result, Vec::new());
                    }
                    let backoff = self.config.retry_backoff_base() * 2u32.pow(retries);
                    trace!(?backoff, attempt = retries, "retrying after version conflict");
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                }
            }
        }
    }

    async fn attempt(&self, request: &BidRequest, retries: u32) -> Attempt {
        // Step 1: read.
        let auction = match self.store.read_auction(request.auction_id).await {
            Ok(auction) => auction,
            Err(StoreError::NotFound(_)) => {
                return Attempt::Terminal(BidResult::rejected(
                    request.ticket_id,
                    RejectReason::AuctionNotFound,
                    retries,
                ))
            }
            Err(err) => {
                warn!(%err, "storage error reading auction");
                return Attempt::Terminal(BidResult::error(
                    request.ticket_id,
                    RejectReason::StorageError,
                    retries,
                ));
            }
        };

        let now = Utc::now();

        // Step 2: status check.
        if auction.status != auction_core::AuctionStatus::Active {
            return Attempt::Terminal(BidResult::rejected(
                request.ticket_id,
                RejectReason::AuctionNotActive,
                retries,
            ));
        }

        // Step 3: clock check, defensive even if the scheduler has not
        // yet flipped `status`.
        if auction.has_ended(now) {
            return Attempt::Terminal(BidResult::rejected(
                request.ticket_id,
                RejectReason::AuctionEnded,
                retries,
            ));
        }

        // Step 4: amount check. Strict `>`; equal amounts are too low.
        if !request.amount.exceeds(&auction.current_bid) {
            return Attempt::Terminal(BidResult::rejected_with_high_bid(
                request.ticket_id,
                RejectReason::BidTooLow,
                auction.current_bid,
                retries,
            ));
        }

        // Step 5: extension decision.
        let extension = self.decide_extension(&auction, now);

        // Step 6: OCC update within a transaction.
        let update = BidUpdate {
            user_id: request.user_id,
            amount: request.amount,
            previous_high_bid: auction.current_bid,
            previous_bid_user_id: auction.current_bid_user_id,
            extension: extension.map(|new_ends_at| Extension { new_ends_at }),
        };

        match self.store.apply_bid(request.auction_id, auction.version, update).await {
            Ok(bid) => {
                let extension_applied = extension.is_some();
                let result = BidResult::accepted(
                    request.ticket_id,
                    bid.id,
                    auction.current_bid,
                    request.amount,
                    extension_applied,
                    retries,
                );

                let ends_at = extension.unwrap_or(auction.ends_at);
                let bid_count = auction.bid_count + 1;
                let mut events = vec![BidEvent {
                    kind: BidEventKind::BidAccepted,
                    auction_id: request.auction_id,
                    amount: request.amount,
                    bidder_id: request.user_id,
                    bid_count,
                    ends_at,
                    extension_applied,
                    timestamp: now,
                }];
                if extension_applied {
                    events.push(BidEvent {
                        kind: BidEventKind::AuctionExtended,
                        auction_id: request.auction_id,
                        amount: request.amount,
                        bidder_id: request.user_id,
                        bid_count,
                        ends_at,
                        extension_applied: true,
                        timestamp: now,
                    });
                }

                Attempt::Accepted { result, events }
            }
            Err(StoreError::VersionConflict(_)) => Attempt::Retry,
            Err(err) => {
                warn!(%err, "storage error applying bid");
                Attempt::Terminal(BidResult::error(
                    request.ticket_id,
                    RejectReason::StorageError,
                    retries,
                ))
            }
        }
    }

    /// `Δ = ends_at − now`. Extensions never reset
    /// `extension_count` — each consumes one of `max_extensions` slots
    /// regardless of how much time remained when it fired.
    fn decide_extension(
        &self,
        auction: &Auction,
        now: chrono::DateTime<Utc>,
    ) -> Option<chrono::DateTime<Utc>> {
        let remaining = auction.time_to_close(now);
        if remaining < auction.snipe_threshold && auction.can_extend() {
            Some(auction.ends_at + chrono_duration(auction.extension_amount))
        } else {
            None
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}
