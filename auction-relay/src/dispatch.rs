use crate::broker::Broker;
use crate::processor::Processor;
use crate::storage::AuctionStore;
use crate::ticket::TicketMap;
use crate::worker::Worker;
use auction_core::config::Config;
use auction_core::{AuctionId, BidRequest, BidResult, Error, RejectReason};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

/// Bounded wait for the fallback send into a (momentarily) full worker
/// inbox, after the initial non-blocking attempt fails: falls back to
/// a blocking send bounded by a small timeout rather than blocking
/// indefinitely.
const WORKER_SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// GC interval for abandoned ticket reservations: a periodic sweep on
/// a bounded age.
const TICKET_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const TICKET_MAX_AGE: Duration = Duration::from_secs(120);

#[derive(Default)]
pub struct Counters {
    total_processed: AtomicU64,
    total_retries: AtomicU64,
}

impl Counters {
    pub(crate) fn record(&self, retries: u32) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.total_retries.fetch_add(u64::from(retries), Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub auction_id: AuctionId,
    pub alive: bool,
}

/// Snapshot for `Engine::stats()`.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub queue_depth: usize,
    pub active_workers: usize,
    pub total_processed: u64,
    pub total_retries: u64,
    pub per_worker: Vec<WorkerStats>,
}

/// Global bid intake and dispatch engine. Owns the intake
/// buffer, the per-auction worker table, and the ticket result map;
/// hands events off to the broker as workers produce them.
///
/// Worker tasks are created lazily and keyed by auction id under a
/// short-held lock; the fallback send into an occasionally-full worker
/// inbox uses a bounded timeout rather than blocking indefinitely.
pub struct Engine<S: ?Sized> {
    intake_tx: mpsc::Sender<BidRequest>,
    workers: Arc<Mutex<HashMap<AuctionId, Worker>>>,
    tickets: Arc<TicketMap>,
    broker: Arc<Broker>,
    processor: Arc<Processor<S>>,
    config: Arc<Config>,
    counters: Arc<Counters>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl<S: AuctionStore + ?Sized + 'static> Engine<S> {
    pub fn start(store: Arc<S>, broker: Arc<Broker>, config: Config) -> Self {
        let config = Arc::new(config);
        let processor = Arc::new(Processor::new(store, config.clone()));
        let tickets = Arc::new(TicketMap::new());
        let workers = Arc::new(Mutex::new(HashMap::new()));
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(Notify::new());

        let (intake_tx, intake_rx) = mpsc::channel(config.intake_queue_size);

        let dispatcher_handle = tokio::spawn(Self::run_dispatcher(
            intake_rx,
            workers.clone(),
            processor.clone(),
            tickets.clone(),
            broker.clone(),
            config.clone(),
            counters.clone(),
            shutdown.clone(),
        ));

        let sweeper_handle = tokio::spawn(Self::run_sweeper(tickets.clone(), shutdown.clone()));

        Self {
            intake_tx,
            workers,
            tickets,
            broker,
            processor,
            config,
            counters,
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            shutdown,
        }
    }

    /// Enqueues a bid for asynchronous processing, or executes it
    /// inline when `config.sync_mode` is set (deterministic tests
    /// only).
    pub async fn submit(&self, request: BidRequest) -> Result<auction_core::TicketId, Error> {
        let ticket_id = request.ticket_id;

        if self.config.sync_mode {
            self.tickets.reserve(ticket_id);
            let (result, events) = self.processor.process(&request).await;
            self.counters.record(result.retries);
            self.tickets.publish(ticket_id, result);
            for event in events {
                self.broker.broadcast(event);
            }
            return Ok(ticket_id);
        }

        self.tickets.reserve(ticket_id);
        match self.intake_tx.try_send(request) {
            Ok(()) => Ok(ticket_id),
            Err(_) => {
                self.tickets.cancel(ticket_id);
                Err(Error::Overloaded)
            }
        }
    }

    /// Waits up to `wait` for the ticket's result. Safe to call at
    /// most once per ticket.
    pub async fn await_ticket(
        &self,
        ticket_id: auction_core::TicketId,
        wait: Duration,
    ) -> Result<BidResult, Error> {
        self.tickets.await_result(ticket_id, wait).await
    }

    pub fn stats(&self) -> EngineStats {
        let workers = self.workers.lock();
        let per_worker: Vec<WorkerStats> = workers
            .iter()
            .map(|(auction_id, worker)| WorkerStats { auction_id: *auction_id, alive: worker.is_alive() })
            .collect();
        let queue_depth = self.config.intake_queue_size - self.intake_tx.capacity();
        EngineStats {
            queue_depth,
            active_workers: per_worker.iter().filter(|w| w.alive).count(),
            total_processed: self.counters.total_processed.load(Ordering::Relaxed),
            total_retries: self.counters.total_retries.load(Ordering::Relaxed),
            per_worker,
        }
    }

    /// Graceful shutdown: stops accepting new dispatch-loop iterations
    /// once the intake buffer is drained, then lets every worker
    /// finish its inbox before returning.
    pub async fn stop(&self) {
        self.shutdown.notify_waiters();

        if let Some(handle) = self.dispatcher_handle.lock().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.sweeper_handle.lock().take() {
            let _ = handle.await;
        }

        let workers: Vec<Worker> = self.workers.lock().drain().map(|(_, w)| w).collect();
        for worker in workers {
            worker.shutdown().await;
        }
    }

    async fn run_dispatcher(
        mut intake_rx: mpsc::Receiver<BidRequest>,
        workers: Arc<Mutex<HashMap<AuctionId, Worker>>>,
        processor: Arc<Processor<S>>,
        tickets: Arc<TicketMap>,
        broker: Arc<Broker>,
        config: Arc<Config>,
        counters: Arc<Counters>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                biased;
                maybe_request = intake_rx.recv() => {
                    match maybe_request {
                        Some(request) => {
                            Self::dispatch_one(request, &workers, &processor, &tickets, &broker, &config, &counters).await;
                        }
                        None => break,
                    }
                }
                _ = shutdown.notified() => {
                    while let Ok(request) = intake_rx.try_recv() {
                        Self::dispatch_one(request, &workers, &processor, &tickets, &broker, &config, &counters).await;
                    }
                    break;
                }
            }
        }
    }

    async fn dispatch_one(
        request: BidRequest,
        workers: &Arc<Mutex<HashMap<AuctionId, Worker>>>,
        processor: &Arc<Processor<S>>,
        tickets: &Arc<TicketMap>,
        broker: &Arc<Broker>,
        config: &Arc<Config>,
        counters: &Arc<Counters>,
    ) {
        let ticket_id = request.ticket_id;
        let auction_id = request.auction_id;

        let sender = {
            let mut workers = workers.lock();
            let needs_spawn = match workers.get(&auction_id) {
                Some(worker) => !worker.is_alive(),
                None => true,
            };
            if needs_spawn {
                workers.insert(
                    auction_id,
                    Worker::spawn(
                        config.worker_inbox_size,
                        processor.clone(),
                        tickets.clone(),
                        broker.clone(),
                        counters.clone(),
                    ),
                );
            }
            workers.get(&auction_id).expect("worker just inserted").sender()
        };

        match sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                match tokio::time::timeout(WORKER_SEND_TIMEOUT, sender.send(request)).await {
                    Ok(Ok(())) => {}
                    _ => {
                        warn!(%auction_id, %ticket_id, "worker inbox saturated; failing ticket");
                        tickets.publish(
                            ticket_id,
                            BidResult::rejected(ticket_id, RejectReason::Overloaded, 0),
                        );
                    }
                }
            }
            Err(TrySendError::Closed(_)) => {
                // Worker task exited between the liveness check and
                // the send (e.g. a panic mid-flight); fail this one
                // ticket and let the next bid for this auction spawn
                // a fresh worker.
                warn!(%auction_id, %ticket_id, "worker closed during dispatch; failing ticket");
                tickets.publish(
                    ticket_id,
                    BidResult::error(ticket_id, RejectReason::InternalError, 0),
                );
            }
        }
    }

    async fn run_sweeper(tickets: Arc<TicketMap>, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(TICKET_SWEEP_INTERVAL) => {
                    tickets.sweep(TICKET_MAX_AGE);
                }
                _ = shutdown.notified() => break,
            }
        }
    }
}
