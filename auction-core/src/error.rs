use crate::{types::RejectReason, AuctionId, Money};
use thiserror::Error;

/// Error kinds the core surfaces. `Overloaded` and `Timeout`
/// are produced by the dispatch engine rather than the processor;
/// everything else is produced reading or writing the auction row.
#[derive(Debug, Error)]
pub enum Error {
    #[error("auction {0} not found")]
    AuctionNotFound(AuctionId),
    #[error("auction {0} is not active")]
    AuctionNotActive(AuctionId),
    #[error("auction {0} has ended")]
    AuctionEnded(AuctionId),
    #[error("bid too low: previous high bid was {previous_high_bid}")]
    BidTooLow { previous_high_bid: Money },
    #[error("auction {0} could not be updated after exhausting the retry budget")]
    VersionConflict(AuctionId),
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("intake is overloaded")]
    Overloaded,
    #[error("ticket result was not available before the deadline")]
    Timeout,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            Self::AuctionNotFound(_) => RejectReason::AuctionNotFound,
            Self::AuctionNotActive(_) => RejectReason::AuctionNotActive,
            Self::AuctionEnded(_) => RejectReason::AuctionEnded,
            Self::BidTooLow { .. } => RejectReason::BidTooLow,
            Self::VersionConflict(_) => RejectReason::VersionConflict,
            Self::StorageError(_) => RejectReason::StorageError,
            Self::Overloaded => RejectReason::Overloaded,
            Self::Timeout => RejectReason::InternalError,
            Self::InternalError(_) => RejectReason::InternalError,
        }
    }
}

#[cfg(feature = "api")]
mod api {
    use super::Error;
    use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
    use serde_json::json;

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = match self {
                Error::AuctionNotFound(_) => StatusCode::NOT_FOUND,
                Error::AuctionNotActive(_)
                | Error::AuctionEnded(_)
                | Error::BidTooLow { .. }
                | Error::VersionConflict(_) => StatusCode::CONFLICT,
                Error::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
                Error::Timeout => StatusCode::OK,
                Error::StorageError(_) | Error::InternalError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let message = self.to_string();
            (status, Json(json!({ "error": message }))).into_response()
        }
    }
}
