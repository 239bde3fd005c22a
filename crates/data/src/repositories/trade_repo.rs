//! Realized trade log.

use anyhow::{Context, Result};
use sqlx::PgConnection;

use crate::models::TradeRecord;

#[derive(Debug, Clone, Copy)]
pub struct TradeRepository;

impl TradeRepository {
    /// Appends one realized close.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(conn: &mut PgConnection, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades
                (id, session_id, position_id, symbol, side, entry_price, exit_price, qty,
                 leverage, sl, tp, pnl, pnl_pct, fees, risk_amount, open_time, close_time,
                 reason, is_partial)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.session_id)
        .bind(&trade.position_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.qty)
        .bind(trade.leverage)
        .bind(trade.sl)
        .bind(trade.tp)
        .bind(trade.pnl)
        .bind(trade.pnl_pct)
        .bind(trade.fees)
        .bind(trade.risk_amount)
        .bind(trade.open_time)
        .bind(trade.close_time)
        .bind(&trade.reason)
        .bind(trade.is_partial)
        .execute(conn)
        .await
        .context("Failed to insert trade")?;

        Ok(())
    }
}
