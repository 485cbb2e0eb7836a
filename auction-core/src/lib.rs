pub mod config;
pub mod error;
pub mod ids;
pub mod money;
pub mod types;

pub use error::Error;
pub use ids::{AuctionId, BidId, TicketId, UserId};
pub use money::Money;
pub use types::{
    Auction, AuctionStatus, Bid, BidEvent, BidEventKind, BidRequest, BidResult, BidResultStatus,
    BidStatus, RejectReason,
};
