mod memory;
mod postgres;

pub use memory::InMemoryAuctionStore;
pub use postgres::PgAuctionStore;

use async_trait::async_trait;
use auction_core::{Auction, AuctionId, Bid, Money, UserId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure modes from the storage port. `VersionConflict` is the OCC
/// signal ("zero rows affected" on the conditional update) and is the
/// only variant the bid processor recovers from locally; everything
/// else becomes `Error::StorageError`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("auction {0} not found")]
    NotFound(AuctionId),
    #[error("version conflict updating auction {0}")]
    VersionConflict(AuctionId),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The conditional update the processor applies in step 6, carrying
/// everything needed to both update the auction row and insert the
/// new accepted bid in one commit.
#[derive(Debug, Clone)]
pub struct BidUpdate {
    pub user_id: UserId,
    pub amount: Money,
    pub previous_high_bid: Money,
    /// The bidder of the auction's current accepted bid, if any.
    /// Carried so the store can transition that bidder's row to
    /// `Outbid` in the same transaction — but only when it differs
    /// from `user_id` (a bidder re-bidding over their own prior bid
    /// never counts as outbidding themselves).
    pub previous_bid_user_id: Option<UserId>,
    pub extension: Option<Extension>,
}

#[derive(Debug, Clone, Copy)]
pub struct Extension {
    pub new_ends_at: DateTime<Utc>,
}

/// Storage port the bid processor depends on. The production adapter
/// is `PgAuctionStore`; `InMemoryAuctionStore` stands in behind the
/// identical trait for `sync_mode` and this crate's own tests.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn read_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError>;

    /// Conditional update: applies `update` to `auction_id` only if its
    /// stored `version` still equals `observed_version`. On success,
    /// `version` is incremented by exactly one and a new `Accepted`
    /// bid row is returned. On a concurrent modification, returns
    /// `StoreError::VersionConflict` and leaves all state untouched.
    async fn apply_bid(
        &self,
        auction_id: AuctionId,
        observed_version: i64,
        update: BidUpdate,
    ) -> Result<Bid, StoreError>;
}
