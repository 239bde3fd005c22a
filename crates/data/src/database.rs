use anyhow::{Context, Result};
use async_trait::async_trait;
use momentum_core::Bar;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::models::{PositionRecord, RunningSession};
use crate::repositories::{
    EvaluationRepository, PositionRepository, Repositories, SessionRepository, TradeRepository,
};
use crate::store::{SessionCycle, TradingStore};

/// Postgres-backed [`TradingStore`].
#[derive(Debug, Clone)]
pub struct PgTradingStore {
    pool: PgPool,
    repos: Repositories,
}

impl PgTradingStore {
    /// Connects to `database_url` and applies pending migrations.
    ///
    /// # Errors
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        let repos = Repositories::new(&pool);
        Self { pool, repos }
    }

    #[must_use]
    pub const fn repositories(&self) -> &Repositories {
        &self.repos
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TradingStore for PgTradingStore {
    async fn upsert_candle(&self, symbol: &str, granularity: &str, bar: &Bar) -> Result<String> {
        self.repos.candles.upsert(symbol, granularity, bar).await
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        self.repos.candles.recent(symbol, granularity, limit).await
    }

    async fn running_sessions(&self, symbol: &str) -> Result<Vec<RunningSession>> {
        self.repos.sessions.running_for_symbol(symbol).await
    }

    async fn open_positions(&self, session_id: &str) -> Result<Vec<PositionRecord>> {
        self.repos.positions.open_for_session(session_id).await
    }

    async fn commit_cycle(&self, cycle: &SessionCycle) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin cycle transaction")?;

        for position in &cycle.updated {
            PositionRepository::update(&mut tx, position).await?;
        }
        for trade in &cycle.trades {
            TradeRepository::insert(&mut tx, trade).await?;
        }
        if let Some(evaluation) = &cycle.evaluation {
            EvaluationRepository::insert(&mut tx, evaluation).await?;
        }
        for position in &cycle.opened {
            PositionRepository::insert(&mut tx, position).await?;
        }
        SessionRepository::update_balance(&mut tx, &cycle.session_id, cycle.balance, cycle.equity)
            .await?;

        tx.commit()
            .await
            .context("Failed to commit cycle transaction")?;

        tracing::debug!(
            session_id = %cycle.session_id,
            trades = cycle.trades.len(),
            opened = cycle.opened.len(),
            updated = cycle.updated.len(),
            "session cycle committed"
        );
        Ok(())
    }
}
