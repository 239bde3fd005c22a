//! Candle repository.
//!
//! Candles are keyed by (symbol, granularity, open time); writes refresh
//! OHLCV values of an existing key in place.

use anyhow::{Context, Result};
use momentum_core::Bar;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CandleRecord;

const UPSERT_CANDLE: &str = r#"
    INSERT INTO candles (id, symbol, granularity, open_time, open, high, low, close, volume)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (symbol, granularity, open_time) DO UPDATE
    SET open = EXCLUDED.open,
        high = EXCLUDED.high,
        low = EXCLUDED.low,
        close = EXCLUDED.close,
        volume = EXCLUDED.volume
    RETURNING id
"#;

#[derive(Debug, Clone)]
pub struct CandleRepository {
    pool: PgPool,
}

impl CandleRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes one candle and returns its id.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, symbol: &str, granularity: &str, bar: &Bar) -> Result<String> {
        let row: (String,) = sqlx::query_as(UPSERT_CANDLE)
            .bind(Uuid::new_v4().to_string())
            .bind(symbol)
            .bind(granularity)
            .bind(bar.open_time)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .fetch_one(&self.pool)
            .await
            .context("Failed to upsert candle")?;

        Ok(row.0)
    }

    /// Upserts a batch of candles in one transaction.
    ///
    /// # Returns
    /// The number of rows written.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_batch(&self, symbol: &str, granularity: &str, bars: &[Bar]) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut written = 0u64;

        for bar in bars {
            sqlx::query_as::<_, (String,)>(UPSERT_CANDLE)
                .bind(Uuid::new_v4().to_string())
                .bind(symbol)
                .bind(granularity)
                .bind(bar.open_time)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to upsert candle")?;
            written += 1;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(written)
    }

    /// The most recent `limit` candles, ascending by open time.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent(&self, symbol: &str, granularity: &str, limit: usize) -> Result<Vec<Bar>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut records = sqlx::query_as::<_, CandleRecord>(
            r#"
            SELECT id, symbol, granularity, open_time, open, high, low, close, volume
            FROM candles
            WHERE symbol = $1 AND granularity = $2
            ORDER BY open_time DESC
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(granularity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent candles")?;

        records.reverse();
        Ok(records.iter().map(CandleRecord::bar).collect())
    }
}
