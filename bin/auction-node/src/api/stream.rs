use super::AppState;
use auction_core::AuctionId;
use auction_relay::AuctionStore;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::str::FromStr;

/// `GET /auctions/:auction_id/stream`: a server-sent-events push
/// channel built on `axum::response::sse::{Event, KeepAlive, Sse}`.
/// Emits the initial `connected` frame, then one
/// `event: <type>\ndata: <json>\n\n` record per broker-delivered
/// `BidEvent`, with axum's built-in keep-alive comment lines standing
/// in for periodic `: keepalive\n\n` pings.
///
/// The broker is lossy by design: a reconnecting client is expected to
/// call the auction read API to resynchronize state before resuming
/// this stream, not to replay missed events.
pub async fn auction_stream<S: AuctionStore + ?Sized + 'static>(
    State(state): State<AppState<S>>,
    Path(auction_id): Path<String>,
) -> Result<Response, axum::http::StatusCode> {
    let auction_id =
        AuctionId::from_str(&auction_id).map_err(|_| axum::http::StatusCode::NOT_FOUND)?;

    let subscriber = state.broker.subscribe(auction_id);

    let connected = stream::once(async move {
        let payload = json!({ "auction_id": auction_id }).to_string();
        Ok(Event::default().event("connected").data(payload))
    });

    let events = stream::unfold(subscriber, |mut subscriber| async move {
        let event = subscriber.recv().await?;
        let payload = serde_json::to_string(&*event).unwrap_or_default();
        let sse_event = Event::default().event(event.kind.as_str()).data(payload);
        Some((Ok::<_, Infallible>(sse_event), subscriber))
    });

    let sse: Sse<_> = Sse::new(connected.chain(events))
        .keep_alive(KeepAlive::new().interval(state.stream_keepalive_interval).text("keepalive"));

    // `Sse` already sets `Content-Type`/`Cache-Control`; `X-Accel-Buffering`
    // is an nginx-specific hint axum has no built-in support for, so
    // it's layered on here rather than in the `Sse` type itself.
    let mut response = sse.into_response();
    response
        .headers_mut()
        .insert(header::HeaderName::from_static("x-accel-buffering"), header::HeaderValue::from_static("no"));
    Ok(response)
}
