//! Strategy and per-symbol override storage.
//!
//! Parameters are stored as JSON documents so new fields pick up their
//! defaults without a migration.

use anyhow::{Context, Result};
use momentum_core::{StrategyParams, SymbolOverride};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StrategyRepository {
    pool: PgPool,
}

impl StrategyRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the default strategy id, creating the seeded default
    /// strategy and its symbol overrides when none exists.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn ensure_default(&self) -> Result<String> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM strategies WHERE is_default ORDER BY created_at LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .context("Failed to query default strategy")?;
        if let Some((id,)) = existing {
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO strategies (id, name, description, is_default, params)
            VALUES ($1, $2, $3, TRUE, $4)
            "#,
        )
        .bind(&id)
        .bind("EMA pullback momentum")
        .bind("EMA50/EMA200 trend with RSI pullback entries and an ATR ladder")
        .bind(Json(StrategyParams::default()))
        .execute(&mut *tx)
        .await
        .context("Failed to insert default strategy")?;

        for o in SymbolOverride::seed_defaults() {
            sqlx::query(
                r#"
                INSERT INTO symbol_overrides (id, strategy_id, symbol, params)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (strategy_id, symbol) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&o.symbol)
            .bind(Json(&o))
            .execute(&mut *tx)
            .await
            .context("Failed to insert symbol override")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        tracing::info!(strategy_id = %id, "seeded default strategy");
        Ok(id)
    }

    /// Loads strategy parameters by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn params(&self, strategy_id: &str) -> Result<Option<StrategyParams>> {
        let row: Option<(Json<StrategyParams>,)> =
            sqlx::query_as("SELECT params FROM strategies WHERE id = $1")
                .bind(strategy_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to query strategy")?;
        Ok(row.map(|(Json(p),)| p))
    }

    /// Loads the override of `symbol` under `strategy_id`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn symbol_override(
        &self,
        strategy_id: &str,
        symbol: &str,
    ) -> Result<Option<SymbolOverride>> {
        let row: Option<(Json<SymbolOverride>,)> = sqlx::query_as(
            "SELECT params FROM symbol_overrides WHERE strategy_id = $1 AND symbol = $2",
        )
        .bind(strategy_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query symbol override")?;

        Ok(row.map(|(Json(mut o),)| {
            o.symbol = symbol.to_string();
            o
        }))
    }
}
