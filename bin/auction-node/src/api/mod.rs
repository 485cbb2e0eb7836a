mod stream;
mod submission;
mod ticket;

use crate::auth::resolve_user_id;
use auction_relay::{AuctionStore, Broker, Engine};
use axum::routing::{get, post};
use axum::{middleware, Router};
use hyper::server::conn::AddrIncoming;
use hyper::server::Builder;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared state behind every handler in this module: the dispatch
/// engine (submission, ticket status) and the event broker (stream).
pub struct AppState<S: ?Sized> {
    pub engine: Arc<Engine<S>>,
    pub broker: Arc<Broker>,
    pub status_query_timeout: Duration,
    pub stream_keepalive_interval: Duration,
}

// Written by hand rather than `#[derive(Clone)]`: every field is
// already reference-counted or `Copy`, so `AppState<S>` is `Clone`
// regardless of whether `S` itself is — which matters because `S` is
// `dyn AuctionStore` in production (see `main.rs`), and a derived impl
// would wrongly require `S: Clone` for `axum::extract::State` to apply.
impl<S: ?Sized> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            broker: self.broker.clone(),
            status_query_timeout: self.status_query_timeout,
            stream_keepalive_interval: self.stream_keepalive_interval,
        }
    }
}

/// Assembles the router for the three external interfaces: bid
/// submission, ticket status polling, and the SSE auction stream.
pub fn router<S: AuctionStore + ?Sized + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/auctions/:auction_id/bids", post(submission::submit_bid::<S>))
        .route("/tickets/:ticket_id", get(ticket::ticket_status::<S>))
        .route("/auctions/:auction_id/stream", get(stream::auction_stream::<S>))
        .route_layer(middleware::from_fn(resolve_user_id))
        .with_state(state)
}

/// Binds the assembled router: a plain `axum::Server::bind(...).serve(...)`
/// handed to `tokio::spawn`, with the handle returning once the
/// listener itself errors or the process is asked to shut down.
pub fn spawn<S: AuctionStore + ?Sized + 'static>(
    host: Ipv4Addr,
    port: u16,
    state: AppState<S>,
) -> (SocketAddr, JoinHandle<Result<(), hyper::Error>>) {
    let addr = SocketAddr::from((host, port));
    let server: Builder<AddrIncoming> = axum::Server::bind(&addr);
    let server = server.serve(router(state).into_make_service());
    let local_addr = server.local_addr();

    let handle = tokio::spawn(async move {
        tracing::info!(address = %local_addr, "listening for bid submissions and streams");
        let result = server.await;
        if let Err(ref err) = result {
            tracing::error!(%err, "auction-node HTTP server exited with an error");
        }
        result
    });

    (local_addr, handle)
}
