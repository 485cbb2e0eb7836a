use super::{AuctionStore, BidUpdate, StoreError};
use async_trait::async_trait;
use auction_core::{Auction, AuctionId, Bid, BidId, BidStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory stand-in for `PgAuctionStore`, behind the identical
/// `AuctionStore` trait. Used by `sync_mode` and by this crate's own
/// property/scenario tests; never used in production.
#[derive(Default)]
pub struct InMemoryAuctionStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    auctions: HashMap<AuctionId, Auction>,
    bids: HashMap<AuctionId, Vec<Bid>>,
}

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_auction(&self, auction: Auction) {
        let mut state = self.state.lock();
        state.auctions.insert(auction.id, auction);
    }

    pub fn bids_for(&self, auction_id: AuctionId) -> Vec<Bid> {
        self.state.lock().bids.get(&auction_id).cloned().unwrap_or_default()
    }

    pub fn auction(&self, auction_id: AuctionId) -> Option<Auction> {
        self.state.lock().auctions.get(&auction_id).cloned()
    }
}

#[async_trait]
impl AuctionStore for InMemoryAuctionStore {
    async fn read_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError> {
        self.state
            .lock()
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::NotFound(auction_id))
    }

    async fn apply_bid(
        &self,
        auction_id: AuctionId,
        observed_version: i64,
        update: BidUpdate,
    ) -> Result<Bid, StoreError> {
        let mut state = self.state.lock();
        let auction =
            state.auctions.get_mut(&auction_id).ok_or(StoreError::NotFound(auction_id))?;

        if auction.version != observed_version {
            return Err(StoreError::VersionConflict(auction_id));
        }

        auction.current_bid = update.amount;
        auction.current_bid_user_id = Some(update.user_id);
        auction.bid_count += 1;
        auction.version += 1;
        if let Some(extension) = update.extension {
            auction.ends_at = extension.new_ends_at;
            auction.extension_count += 1;
        }

        let bid = Bid {
            id: BidId::new(),
            auction_id,
            user_id: update.user_id,
            amount: update.amount,
            status: BidStatus::Accepted,
            previous_high_bid: update.previous_high_bid,
            created_at: Utc::now(),
        };

        let history = state.bids.entry(auction_id).or_default();
        if let Some(previous_user) = update.previous_bid_user_id {
            if previous_user != update.user_id {
                for prior in history.iter_mut() {
                    if prior.user_id == previous_user && prior.status == BidStatus::Accepted {
                        prior.status = BidStatus::Outbid;
                    }
                }
            }
        }
        history.push(bid.clone());

        Ok(bid)
    }
}
