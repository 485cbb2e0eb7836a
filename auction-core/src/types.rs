use crate::{ids::TicketId, AuctionId, BidId, Money, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `scheduled → active → ended`, with `cancelled` reachable from any
/// non-terminal state. Transitions into `active`/`ended` are driven by
/// an external scheduler; this workspace only ever reads `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

/// The persistent row shape the bid processor reads and conditionally
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub status: AuctionStatus,
    pub current_bid: Money,
    pub current_bid_user_id: Option<UserId>,
    pub bid_count: u32,
    pub version: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub extension_count: u32,
    pub max_extensions: u32,
    pub snipe_threshold: Duration,
    pub extension_amount: Duration,
}

impl Auction {
    /// `Δ = ends_at − now`. Saturates at zero so a bid that arrives
    /// after the stated close is always treated as "within threshold"
    /// rather than producing a negative duration.
    pub fn time_to_close(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).to_std().unwrap_or_default()
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    pub fn can_extend(&self) -> bool {
        self.extension_count < self.max_extensions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Accepted,
    Outbid,
    Rejected,
}

/// An append-only row: at most one `Accepted` bid per auction exists at
/// any instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: BidStatus,
    pub previous_high_bid: Money,
    pub created_at: DateTime<Utc>,
}

/// In-flight, never persisted: the unit of work the dispatch engine
/// routes to a per-auction worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRequest {
    pub ticket_id: TicketId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl BidRequest {
    pub fn new(auction_id: AuctionId, user_id: UserId, amount: Money) -> Self {
        Self { ticket_id: TicketId::new(), auction_id, user_id, amount, created_at: Utc::now() }
    }
}

/// Why a bid did not become the new high bid, or why a result could
/// not be produced at all. Mirrors the error enum's kinds exactly; the
/// `Retry` variant is an internal processor signal and is never the
/// `reason` on a `BidResult` an external caller observes (the
/// processor either resolves it into an accept or folds it into
/// `VersionConflict` once the retry budget is spent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AuctionNotFound,
    AuctionNotActive,
    AuctionEnded,
    BidTooLow,
    VersionConflict,
    StorageError,
    Overloaded,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidResultStatus {
    Accepted,
    Rejected,
    Error,
}

/// In-flight, never persisted: the terminal verdict for one ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidResult {
    pub ticket_id: TicketId,
    pub status: BidResultStatus,
    pub reason: Option<RejectReason>,
    pub bid_id: Option<BidId>,
    pub previous_high_bid: Option<Money>,
    pub new_high_bid: Option<Money>,
    pub extension_applied: bool,
    pub retries: u32,
    pub processed_at: DateTime<Utc>,
}

impl BidResult {
    pub fn accepted(
        ticket_id: TicketId,
        bid_id: BidId,
        previous_high_bid: Money,
        new_high_bid: Money,
        extension_applied: bool,
        retries: u32,
    ) -> Self {
        Self {
            ticket_id,
            status: BidResultStatus::Accepted,
            reason: None,
            bid_id: Some(bid_id),
            previous_high_bid: Some(previous_high_bid),
            new_high_bid: Some(new_high_bid),
            extension_applied,
            retries,
            processed_at: Utc::now(),
        }
    }

    pub fn rejected(ticket_id: TicketId, reason: RejectReason, retries: u32) -> Self {
        Self {
            ticket_id,
            status: BidResultStatus::Rejected,
            reason: Some(reason),
            bid_id: None,
            previous_high_bid: None,
            new_high_bid: None,
            extension_applied: false,
            retries,
            processed_at: Utc::now(),
        }
    }

    pub fn rejected_with_high_bid(
        ticket_id: TicketId,
        reason: RejectReason,
        previous_high_bid: Money,
        retries: u32,
    ) -> Self {
        let mut result = Self::rejected(ticket_id, reason, retries);
        result.previous_high_bid = Some(previous_high_bid);
        result
    }

    pub fn error(ticket_id: TicketId, reason: RejectReason, retries: u32) -> Self {
        Self {
            ticket_id,
            status: BidResultStatus::Error,
            reason: Some(reason),
            bid_id: None,
            previous_high_bid: None,
            new_high_bid: None,
            extension_applied: false,
            retries,
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidEventKind {
    BidAccepted,
    AuctionExtended,
    AuctionEnded,
}

impl BidEventKind {
    /// The `event: <type>` name on the wire, matching the
    /// `serde(rename_all = "snake_case")` spelling used in the JSON body.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BidAccepted => "bid_accepted",
            Self::AuctionExtended => "auction_extended",
            Self::AuctionEnded => "auction_ended",
        }
    }
}

/// Broadcast payload fanned out to stream subscribers. See
/// `DESIGN.md` for why this workspace emits a distinct
/// `AuctionExtended` event *in addition to* `extension_applied` on
/// `BidAccepted`, rather than choosing one form exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidEvent {
    #[serde(rename = "type")]
    pub kind: BidEventKind,
    pub auction_id: AuctionId,
    pub amount: Money,
    pub bidder_id: UserId,
    pub bid_count: u32,
    pub ends_at: DateTime<Utc>,
    pub extension_applied: bool,
    pub timestamp: DateTime<Utc>,
}
