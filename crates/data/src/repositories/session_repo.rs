//! Session repository.

use anyhow::{Context, Result};
use momentum_core::{ExchangeCredentials, SessionOverrides, StrategyParams, SymbolOverride};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::{RunningSession, SessionRecord, SessionStatus};

/// Joined row of a session with strategy, override and owner keys.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    strategy_id: String,
    symbol: String,
    leverage: i32,
    status: String,
    simulation: bool,
    starting_balance: f64,
    current_balance: f64,
    current_equity: f64,
    risk_per_trade_pct: Option<f64>,
    max_notional_usdt: Option<f64>,
    min_profit_usdt: Option<f64>,
    strategy_params: Json<StrategyParams>,
    override_params: Option<Json<SymbolOverride>>,
    api_key: Option<String>,
    api_secret: Option<String>,
    passphrase: Option<String>,
}

impl SessionRow {
    fn into_running(self) -> RunningSession {
        let credentials = match (self.api_key, self.api_secret, self.passphrase) {
            (Some(key), Some(secret), Some(pass)) => {
                Some(ExchangeCredentials::new(key, secret, pass)).filter(ExchangeCredentials::is_complete)
            }
            _ => None,
        };
        let symbol_override = self.override_params.map(|Json(mut o)| {
            o.symbol.clone_from(&self.symbol);
            o
        });

        RunningSession {
            session: SessionRecord {
                id: self.id,
                user_id: self.user_id,
                strategy_id: self.strategy_id,
                symbol: self.symbol,
                leverage: u32::try_from(self.leverage.max(1)).unwrap_or(1),
                status: SessionStatus::parse(&self.status).unwrap_or(SessionStatus::Stopped),
                simulation: self.simulation,
                starting_balance: self.starting_balance,
                current_balance: self.current_balance,
                current_equity: self.current_equity,
                overrides: SessionOverrides {
                    risk_per_trade: self.risk_per_trade_pct,
                    max_notional_usdt: self.max_notional_usdt,
                    min_profit_usdt: self.min_profit_usdt,
                },
            },
            strategy: self.strategy_params.0,
            symbol_override,
            credentials,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Running sessions on `symbol` with their relations.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn running_for_symbol(&self, symbol: &str) -> Result<Vec<RunningSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.id, s.user_id, s.strategy_id, s.symbol, s.leverage, s.status,
                   s.simulation, s.starting_balance, s.current_balance, s.current_equity,
                   s.risk_per_trade_pct, s.max_notional_usdt, s.min_profit_usdt,
                   st.params AS strategy_params,
                   o.params AS override_params,
                   u.bitget_api_key AS api_key,
                   u.bitget_api_secret AS api_secret,
                   u.bitget_passphrase AS passphrase
            FROM sessions s
            JOIN strategies st ON st.id = s.strategy_id
            LEFT JOIN symbol_overrides o ON o.strategy_id = s.strategy_id AND o.symbol = s.symbol
            LEFT JOIN users u ON u.id = s.user_id
            WHERE s.symbol = $1 AND s.status = 'running'
            ORDER BY s.created_at ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query running sessions")?;

        Ok(rows.into_iter().map(SessionRow::into_running).collect())
    }

    /// Stores the session's balance and equity after a cycle.
    ///
    /// # Errors
    /// Returns an error if the session does not exist or the update fails.
    pub async fn update_balance(
        conn: &mut PgConnection,
        session_id: &str,
        balance: f64,
        equity: f64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET current_balance = $2, current_equity = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(balance)
        .bind(equity)
        .execute(conn)
        .await
        .context("Failed to update session balance")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("unknown session {session_id}");
        }
        Ok(())
    }
}
