mod api;
mod auth;
mod config;
mod cli;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use auction_relay::{AuctionStore, Broker, Engine, InMemoryAuctionStore, PgAuctionStore};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn setup_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_store(config: &Config) -> eyre::Result<Arc<dyn AuctionStore>> {
    match &config.database_url {
        Some(database_url) => {
            tracing::info!("connecting to storage backend");
            let store = PgAuctionStore::connect(database_url, config.max_db_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "no `database_url` configured; running against an in-memory store \
                 (not durable, intended for local development only)"
            );
            Ok(Arc::new(InMemoryAuctionStore::new()))
        }
    }
}

async fn serve(config: Config) -> eyre::Result<()> {
    let broker = Broker::new(config.core.broker_event_queue_size);
    let store = build_store(&config).await?;
    let status_query_timeout = std::time::Duration::from_secs(config.status_query_timeout_secs);
    let stream_keepalive_interval = config.core.stream_keepalive_interval();
    let engine = Arc::new(Engine::<dyn AuctionStore>::start(store, broker.clone(), config.core));

    let state = api::AppState {
        engine: engine.clone(),
        broker,
        status_query_timeout,
        stream_keepalive_interval,
    };

    let (address, server) = api::spawn(config.host, config.port, state);
    tracing::info!(%address, "auction-node listening");

    tokio::select! {
        result = server => {
            result??;
        }
        _ = signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining in-flight bids...");
        }
    }

    engine.stop().await;
    tracing::info!("auction-node shut down cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(cmd) => {
            let config = match cmd.config_file {
                Some(path) => Config::from_toml_file(path)?,
                None => Config::default(),
            };
            serve(config).await
        }
        Commands::Config(cmd) => {
            let config = Config::from_toml_file(cmd.config_file)?;
            tracing::info!("{:?}", config);
            Ok(())
        }
    }
}
