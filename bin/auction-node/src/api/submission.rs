use super::AppState;
use crate::auth::CurrentUser;
use auction_core::{AuctionId, BidRequest, Error, Money};
use auction_relay::AuctionStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

/// `{"amount": <decimal string or number>}`. `max_bid` is accepted and
/// parsed (reserved for future auto-bid) but never acted on by this
/// core.
#[derive(Debug, Deserialize)]
pub struct SubmitBidBody {
    pub amount: AmountValue,
    #[allow(dead_code)]
    pub max_bid: Option<AmountValue>,
}

/// Accepts either a JSON string or a JSON number for `amount`/`max_bid`.
/// The number variant holds a `serde_json::Number` rather than `f64` —
/// with `serde_json`'s `arbitrary_precision` feature enabled workspace-
/// wide, that preserves the exact decimal digits from the wire, so a
/// bid amount is never rounded through binary floating point on its
/// way into `Money`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountValue {
    Text(String),
    Number(serde_json::Number),
}

impl AmountValue {
    fn parse(&self) -> Result<Money, auction_core::money::MoneyError> {
        match self {
            AmountValue::Text(text) => Money::from_str(text),
            AmountValue::Number(number) => Money::from_str(&number.to_string()),
        }
    }
}

/// `POST /auctions/:auction_id/bids`. Converts request bytes into
/// a `BidRequest` and hands it to the dispatch engine; the verdict is
/// delivered asynchronously via the stream or the ticket-status poll,
/// never in this response.
pub async fn submit_bid<S: AuctionStore + ?Sized + 'static>(
    State(state): State<AppState<S>>,
    Path(auction_id): Path<String>,
    user: Option<CurrentUser>,
    Json(body): Json<SubmitBidBody>,
) -> impl IntoResponse {
    let Some(CurrentUser(user_id)) = user else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing resolved user identity"})))
            .into_response();
    };

    let Ok(auction_id) = AuctionId::from_str(&auction_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "auction id could not be parsed"})))
            .into_response();
    };

    let amount = match body.amount.parse() {
        Ok(amount) if amount > Money::ZERO => amount,
        Ok(_) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "amount must be positive"})))
                .into_response()
        }
        Err(err) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()})))
                .into_response()
        }
    };

    let request = BidRequest::new(auction_id, user_id, amount);
    let ticket_id = request.ticket_id;

    match state.engine.submit(request).await {
        Ok(ticket_id) => {
            (StatusCode::ACCEPTED, Json(json!({"ticket_id": ticket_id, "status": "queued"})))
                .into_response()
        }
        Err(Error::Overloaded) => {
            tracing::warn!(%ticket_id, %auction_id, "intake overloaded");
            Error::Overloaded.into_response()
        }
        Err(err) => err.into_response(),
    }
}
