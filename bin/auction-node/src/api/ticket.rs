use super::AppState;
use auction_core::{Error, TicketId};
use auction_relay::AuctionStore;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::str::FromStr;

/// `GET /tickets/:ticket_id`. Blocks up to a short timeout
/// awaiting the processor's verdict; on timeout, reports that the bid
/// is still in flight rather than treating it as a failure.
pub async fn ticket_status<S: AuctionStore + ?Sized + 'static>(
    State(state): State<AppState<S>>,
    Path(ticket_id): Path<String>,
) -> impl IntoResponse {
    let Ok(ticket_id) = TicketId::from_str(&ticket_id) else {
        return (axum::http::StatusCode::NOT_FOUND, Json(json!({"error": "ticket id could not be parsed"})))
            .into_response();
    };

    match state.engine.await_ticket(ticket_id, state.status_query_timeout).await {
        Ok(result) => (axum::http::StatusCode::OK, Json(result)).into_response(),
        Err(Error::Timeout) => {
            (axum::http::StatusCode::OK, Json(json!({"status": "processing"}))).into_response()
        }
        Err(err) => err.into_response(),
    }
}
