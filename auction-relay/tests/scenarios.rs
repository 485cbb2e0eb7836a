//! End-to-end auction scenarios and cross-cutting bidding invariants,
//! run against the dispatch engine in synchronous mode so outcomes are
//! deterministic without a real database.

use auction_core::config::Config;
use auction_core::{Auction, AuctionId, AuctionStatus, Bid, BidRequest, BidResultStatus, Money, RejectReason, UserId};
use auction_relay::{AuctionStore, Broker, BidUpdate, Engine, InMemoryAuctionStore, Processor, StoreError};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn auction(
    current_bid: &str,
    bid_count: u32,
    ends_in: ChronoDuration,
    snipe_threshold: Duration,
    extension_amount: Duration,
    max_extensions: u32,
    extension_count: u32,
) -> Auction {
    let now = Utc::now();
    Auction {
        id: AuctionId::new(),
        status: AuctionStatus::Active,
        current_bid: current_bid.parse().unwrap(),
        current_bid_user_id: if bid_count > 0 { Some(UserId::new()) } else { None },
        bid_count,
        version: 0,
        starts_at: now - ChronoDuration::hours(1),
        ends_at: now + ends_in,
        extension_count,
        max_extensions,
        snipe_threshold,
        extension_amount,
    }
}

fn sync_engine(store: Arc<InMemoryAuctionStore>) -> Engine<InMemoryAuctionStore> {
    let broker = Broker::new(100);
    let mut config = Config::default();
    config.sync_mode = true;
    Engine::start(store, broker, config)
}

#[tokio::test]
async fn first_bid_is_accepted_and_updates_the_auction_row() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let user = UserId::new();
    let request = BidRequest::new(auction_id, user, "150.00".parse().unwrap());
    let ticket_id = engine.submit(request).await.unwrap();
    let result = engine.await_ticket(ticket_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(result.status, BidResultStatus::Accepted);
    assert_eq!(result.previous_high_bid, Some(Money::ZERO));
    assert_eq!(result.new_high_bid, Some("150.00".parse().unwrap()));

    let row = store.auction(auction_id).unwrap();
    assert_eq!(row.current_bid, "150.00".parse().unwrap());
    assert_eq!(row.bid_count, 1);
    assert_eq!(row.version, 1);

    let bids = store.bids_for(auction_id);
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].status, auction_core::BidStatus::Accepted);
}

#[tokio::test]
async fn bid_at_or_below_current_high_is_rejected() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let seed = auction("200.00", 1, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    let auction_id = seed.id;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let request = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let ticket_id = engine.submit(request).await.unwrap();
    let result = engine.await_ticket(ticket_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(result.status, BidResultStatus::Rejected);
    assert_eq!(result.reason, Some(RejectReason::BidTooLow));
    assert_eq!(result.previous_high_bid, Some("200.00".parse().unwrap()));

    let row = store.auction(auction_id).unwrap();
    assert_eq!(row.current_bid, "200.00".parse().unwrap());
    assert_eq!(row.version, 0);
}

#[tokio::test]
async fn bid_within_snipe_threshold_extends_the_auction() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let seed = auction(
        "100.00",
        1,
        ChronoDuration::seconds(60),
        Duration::from_secs(120),
        Duration::from_secs(120),
        10,
        0,
    );
    let auction_id = seed.id;
    let original_ends_at = seed.ends_at;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let request = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let ticket_id = engine.submit(request).await.unwrap();
    let result = engine.await_ticket(ticket_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(result.status, BidResultStatus::Accepted);
    assert!(result.extension_applied);

    let row = store.auction(auction_id).unwrap();
    assert_eq!(row.ends_at, original_ends_at + ChronoDuration::seconds(120));
    assert_eq!(row.extension_count, 1);
}

#[tokio::test]
async fn extension_budget_exhausted_leaves_end_time_unchanged() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let seed = auction(
        "100.00",
        1,
        ChronoDuration::seconds(60),
        Duration::from_secs(120),
        Duration::from_secs(120),
        10,
        10, // extension_count == max_extensions
    );
    let auction_id = seed.id;
    let original_ends_at = seed.ends_at;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let request = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let ticket_id = engine.submit(request).await.unwrap();
    let result = engine.await_ticket(ticket_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(result.status, BidResultStatus::Accepted);
    assert!(!result.extension_applied);

    let row = store.auction(auction_id).unwrap();
    assert_eq!(row.ends_at, original_ends_at);
    assert_eq!(row.extension_count, 10);
}

#[tokio::test]
async fn bid_on_ended_auction_is_rejected() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("100.00", 1, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.status = AuctionStatus::Ended;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let request = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let ticket_id = engine.submit(request).await.unwrap();
    let result = engine.await_ticket(ticket_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(result.status, BidResultStatus::Rejected);
    assert_eq!(result.reason, Some(RejectReason::AuctionNotActive));
}

#[tokio::test]
async fn outbid_transition_marks_only_the_prior_different_bidder() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let u1 = UserId::new();
    let u2 = UserId::new();

    let t1 = engine.submit(BidRequest::new(auction_id, u1, "100.00".parse().unwrap())).await.unwrap();
    engine.await_ticket(t1, Duration::from_secs(1)).await.unwrap();

    let t2 = engine.submit(BidRequest::new(auction_id, u2, "150.00".parse().unwrap())).await.unwrap();
    let result = engine.await_ticket(t2, Duration::from_secs(1)).await.unwrap();
    assert_eq!(result.status, BidResultStatus::Accepted);

    let bids = store.bids_for(auction_id);
    let u1_bid = bids.iter().find(|b| b.user_id == u1).unwrap();
    let u2_bid = bids.iter().find(|b| b.user_id == u2).unwrap();
    assert_eq!(u1_bid.status, auction_core::BidStatus::Outbid);
    assert_eq!(u2_bid.status, auction_core::BidStatus::Accepted);
}

#[tokio::test]
async fn self_rebid_does_not_outbid_own_prior_bid() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let engine = sync_engine(store.clone());
    let user = UserId::new();

    let t1 = engine.submit(BidRequest::new(auction_id, user, "100.00".parse().unwrap())).await.unwrap();
    engine.await_ticket(t1, Duration::from_secs(1)).await.unwrap();

    let t2 = engine.submit(BidRequest::new(auction_id, user, "150.00".parse().unwrap())).await.unwrap();
    engine.await_ticket(t2, Duration::from_secs(1)).await.unwrap();

    let bids = store.bids_for(auction_id);
    assert_eq!(bids.len(), 2);
    // A same-user re-bid never marks the user's own earlier accepted
    // bid `Outbid` — only a *different* bidder's prior accepted bid
    // transitions.
    assert!(bids.iter().all(|b| b.status == auction_core::BidStatus::Accepted));
}

#[tokio::test]
async fn concurrent_bids_on_one_auction_keep_the_high_bid_monotonic() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 50, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let broker = Broker::new(1000);
    let mut config = Config::default();
    config.sync_mode = false;
    let engine = Arc::new(Engine::start(store.clone(), broker, config));

    let mut tickets = Vec::new();
    for amount in 1..=20 {
        let amount: Money = format!("{amount}.00").parse().unwrap();
        let request = BidRequest::new(auction_id, UserId::new(), amount);
        tickets.push(engine.submit(request).await.unwrap());
    }

    let mut seen_bids = Vec::new();
    for ticket_id in tickets {
        let result = engine.await_ticket(ticket_id, Duration::from_secs(5)).await.unwrap();
        if result.status == BidResultStatus::Accepted {
            seen_bids.push(result.new_high_bid.unwrap());
        }
    }

    for window in seen_bids.windows(2) {
        assert!(window[1] > window[0], "accepted high bids must be strictly increasing");
    }

    engine.stop().await;
}

#[tokio::test]
async fn two_concurrent_bids_on_one_auction_both_resolve_to_the_greater_amount() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("100.00", 1, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let broker = Broker::new(100);
    let mut config = Config::default();
    config.sync_mode = false;
    let engine = Arc::new(Engine::start(store.clone(), broker, config));

    let lower = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let higher = BidRequest::new(auction_id, UserId::new(), "160.00".parse().unwrap());
    let lower_ticket = engine.submit(lower).await.unwrap();
    let higher_ticket = engine.submit(higher).await.unwrap();

    let lower_result = engine.await_ticket(lower_ticket, Duration::from_secs(5)).await.unwrap();
    let higher_result = engine.await_ticket(higher_ticket, Duration::from_secs(5)).await.unwrap();

    // These two requests share one auction so the per-auction worker
    // applies them strictly in submission order: the 150.00 bid commits
    // first, and the 160.00 bid, being strictly greater, always lands
    // as a clean second accept rather than exercising a real OCC retry.
    // The invariant this checks is interleaving-independent: both
    // accepted, final state reflects the greater amount.
    assert_eq!(lower_result.status, BidResultStatus::Accepted);
    assert_eq!(higher_result.status, BidResultStatus::Accepted);

    let row = store.auction(auction_id).unwrap();
    assert_eq!(row.current_bid, "160.00".parse().unwrap());
    assert_eq!(row.bid_count, 3); // seed's implicit 1 + two new accepts
    assert_eq!(row.version, 2);

    engine.stop().await;
}

#[tokio::test]
async fn subscriber_sees_one_event_per_accepted_bid_in_commit_order() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let broker = Broker::new(100);
    let mut subscriber = broker.subscribe(auction_id);
    let mut config = Config::default();
    config.sync_mode = false;
    let engine = Arc::new(Engine::start(store.clone(), broker, config));

    let mut tickets = Vec::new();
    for amount in 1..=5 {
        let amount: Money = format!("{amount}.00").parse().unwrap();
        let request = BidRequest::new(auction_id, UserId::new(), amount);
        tickets.push(engine.submit(request).await.unwrap());
    }

    let mut accepted = 0;
    for ticket_id in tickets {
        let result = engine.await_ticket(ticket_id, Duration::from_secs(5)).await.unwrap();
        if result.status == BidResultStatus::Accepted {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 5, "every strictly increasing bid in this sequence is accepted");

    // Each accepted bid produces exactly one `BidAccepted` event, and a
    // single subscriber observes them in commit order.
    let mut seen_counts = Vec::new();
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("event arrives before timeout")
            .expect("broker still open");
        assert_eq!(event.kind, auction_core::BidEventKind::BidAccepted);
        seen_counts.push(event.bid_count);
    }
    for window in seen_counts.windows(2) {
        assert!(window[1] > window[0], "subscriber must see events in commit order");
    }

    engine.stop().await;
}

/// Wraps `InMemoryAuctionStore` to simulate an out-of-process scheduler
/// closing the auction between a bid's first OCC attempt and its retry:
/// the first `apply_bid` call is forced into a version conflict, and
/// every `read_auction` from the second attempt onward reports
/// `Ended` without the underlying row ever actually changing.
struct SchedulerRaceStore {
    inner: InMemoryAuctionStore,
    apply_attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl AuctionStore for SchedulerRaceStore {
    async fn read_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError> {
        let mut auction = self.inner.read_auction(auction_id).await?;
        if self.apply_attempts.load(Ordering::SeqCst) > 0 {
            auction.status = AuctionStatus::Ended;
        }
        Ok(auction)
    }

    async fn apply_bid(
        &self,
        auction_id: AuctionId,
        observed_version: i64,
        update: BidUpdate,
    ) -> Result<Bid, StoreError> {
        if self.apply_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::VersionConflict(auction_id));
        }
        self.inner.apply_bid(auction_id, observed_version, update).await
    }
}

#[tokio::test]
async fn scheduler_closing_mid_retry_is_observed_fresh_on_the_next_attempt() {
    let inner = InMemoryAuctionStore::new();
    let seed = auction("100.00", 1, ChronoDuration::hours(1), Duration::from_secs(0), Duration::from_secs(0), 10, 0);
    let auction_id = seed.id;
    inner.insert_auction(seed);

    let store = Arc::new(SchedulerRaceStore { inner, apply_attempts: AtomicUsize::new(0) });
    let config = Arc::new(Config::default());
    let processor = Processor::new(store, config);

    let request = BidRequest::new(auction_id, UserId::new(), "150.00".parse().unwrap());
    let (result, events) = processor.process(&request).await;

    // No special-casing exists for this interleaving: the OCC loop
    // simply re-reads from step 1 on every retry attempt, so a
    // scheduler write that lands between attempts is picked up on the
    // very next one rather than being applied against stale state.
    assert_eq!(result.status, BidResultStatus::Rejected);
    assert_eq!(result.reason, Some(RejectReason::AuctionNotActive));
    assert_eq!(result.retries, 1);
    assert!(events.is_empty());
}

#[tokio::test]
async fn every_submitted_ticket_reaches_a_terminal_outcome() {
    let store = Arc::new(InMemoryAuctionStore::new());
    let mut seed = auction("0.00", 0, ChronoDuration::hours(1), Duration::from_secs(120), Duration::from_secs(120), 10, 0);
    seed.current_bid_user_id = None;
    let auction_id = seed.id;
    store.insert_auction(seed);

    let broker = Broker::new(100);
    let mut config = Config::default();
    config.sync_mode = false;
    let engine = Arc::new(Engine::start(store.clone(), broker, config));

    // A too-low bid after a healthy one: both tickets must resolve,
    // one accepted and one terminally rejected, never left `processing`.
    let first = engine
        .submit(BidRequest::new(auction_id, UserId::new(), "50.00".parse().unwrap()))
        .await
        .unwrap();
    let second = engine
        .submit(BidRequest::new(auction_id, UserId::new(), "10.00".parse().unwrap()))
        .await
        .unwrap();

    let first_result = engine.await_ticket(first, Duration::from_secs(2)).await.unwrap();
    let second_result = engine.await_ticket(second, Duration::from_secs(2)).await.unwrap();

    assert_eq!(first_result.status, BidResultStatus::Accepted);
    assert_eq!(second_result.status, BidResultStatus::Rejected);
    assert_eq!(second_result.reason, Some(RejectReason::BidTooLow));

    engine.stop().await;
}
