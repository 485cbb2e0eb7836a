pub mod broker;
pub mod dispatch;
pub mod processor;
pub mod storage;
pub mod ticket;
pub mod worker;

pub use broker::{Broker, BrokerStats, Subscriber, SubscriberId};
pub use dispatch::{Engine, EngineStats, WorkerStats};
pub use processor::Processor;
pub use storage::{AuctionStore, BidUpdate, InMemoryAuctionStore, PgAuctionStore, StoreError};
