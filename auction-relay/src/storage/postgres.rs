use super::{AuctionStore, BidUpdate, StoreError};
use async_trait::async_trait;
use auction_core::{Auction, AuctionId, AuctionStatus, Bid, BidId, BidStatus, Money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Postgres-backed `AuctionStore`. The conditional-update-plus-insert
/// transaction is a direct `sqlx` expression of the optimistic
/// concurrency check: update and bump the version only if the
/// observed version still matches.
pub struct PgAuctionStore {
    pool: PgPool,
}

impl PgAuctionStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_from_row(status: &str) -> AuctionStatus {
    match status {
        "scheduled" => AuctionStatus::Scheduled,
        "active" => AuctionStatus::Active,
        "ended" => AuctionStatus::Ended,
        _ => AuctionStatus::Cancelled,
    }
}

fn status_to_str(status: AuctionStatus) -> &'static str {
    match status {
        AuctionStatus::Scheduled => "scheduled",
        AuctionStatus::Active => "active",
        AuctionStatus::Ended => "ended",
        AuctionStatus::Cancelled => "cancelled",
    }
}

fn secs_to_duration(secs: i64) -> Duration {
    Duration::from_secs(secs.max(0) as u64)
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn read_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError> {
        let row = sqlx::query(
            "SELECT status, current_bid, current_bid_user_id, bid_count, version, \
             starts_at, ends_at, extension_count, max_extensions, \
             snipe_threshold_secs, extension_amount_secs \
             FROM auctions WHERE id = $1",
        )
        .bind(auction_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
        .ok_or(StoreError::NotFound(auction_id))?;

        let current_bid: Decimal = row.try_get("current_bid").map_err(backend_err)?;
        let current_bid = Money::new(current_bid).map_err(|err| StoreError::Backend(err.to_string()))?;

        Ok(Auction {
            id: auction_id,
            status: status_from_row(row.try_get::<String, _>("status").map_err(backend_err)?.as_str()),
            current_bid,
            current_bid_user_id: row
                .try_get::<Option<uuid::Uuid>, _>("current_bid_user_id")
                .map_err(backend_err)?
                .map(Into::into),
            bid_count: row.try_get::<i32, _>("bid_count").map_err(backend_err)? as u32,
            version: row.try_get("version").map_err(backend_err)?,
            starts_at: row.try_get::<DateTime<Utc>, _>("starts_at").map_err(backend_err)?,
            ends_at: row.try_get::<DateTime<Utc>, _>("ends_at").map_err(backend_err)?,
            extension_count: row.try_get::<i32, _>("extension_count").map_err(backend_err)? as u32,
            max_extensions: row.try_get::<i32, _>("max_extensions").map_err(backend_err)? as u32,
            snipe_threshold: secs_to_duration(
                row.try_get::<i64, _>("snipe_threshold_secs").map_err(backend_err)?,
            ),
            extension_amount: secs_to_duration(
                row.try_get::<i64, _>("extension_amount_secs").map_err(backend_err)?,
            ),
        })
    }

    async fn apply_bid(
        &self,
        auction_id: AuctionId,
        observed_version: i64,
        update: BidUpdate,
    ) -> Result<Bid, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        let (new_ends_at, extends) = match update.extension {
            Some(extension) => (Some(extension.new_ends_at), true),
            None => (None, false),
        };

        // Conditional update: `WHERE id = :auction_id AND version = :observed_version`.
        // Zero rows affected signals a concurrent modification.
        let result = sqlx::query(
            "UPDATE auctions SET \
                current_bid = $1, \
                current_bid_user_id = $2, \
                bid_count = bid_count + 1, \
                version = version + 1, \
                ends_at = COALESCE($3, ends_at), \
                extension_count = extension_count + CASE WHEN $4 THEN 1 ELSE 0 END \
             WHERE id = $5 AND version = $6",
        )
        .bind(update.amount.as_decimal())
        .bind(update.user_id.0)
        .bind(new_ends_at)
        .bind(extends)
        .bind(auction_id.0)
        .bind(observed_version)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(backend_err)?;
            return Err(StoreError::VersionConflict(auction_id));
        }

        let bid_id = BidId::new();
        sqlx::query(
            "INSERT INTO bids (id, auction_id, user_id, amount, status, previous_high_bid, created_at) \
             VALUES ($1, $2, $3, $4, 'accepted', $5, now())",
        )
        .bind(bid_id.0)
        .bind(auction_id.0)
        .bind(update.user_id.0)
        .bind(update.amount.as_decimal())
        .bind(update.previous_high_bid.as_decimal())
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        if let Some(previous_user) = update.previous_bid_user_id {
            if previous_user != update.user_id {
                sqlx::query(
                    "UPDATE bids SET status = 'outbid' \
                     WHERE auction_id = $1 AND user_id = $2 AND status = 'accepted'",
                )
                .bind(auction_id.0)
                .bind(previous_user.0)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;
            }
        }

        tx.commit().await.map_err(backend_err)?;

        tracing::trace!(%auction_id, %bid_id, "committed accepted bid");

        Ok(Bid {
            id: bid_id,
            auction_id,
            user_id: update.user_id,
            amount: update.amount,
            status: BidStatus::Accepted,
            previous_high_bid: update.previous_high_bid,
            created_at: Utc::now(),
        })
    }
}

fn backend_err(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
