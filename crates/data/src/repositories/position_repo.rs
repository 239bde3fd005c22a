//! Position and take-profit ladder repository.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use momentum_core::Side;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{PositionRecord, TpTargetRecord};

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    id: String,
    session_id: String,
    symbol: String,
    side: String,
    qty: f64,
    original_qty: f64,
    entry_price: f64,
    sl: f64,
    tp: f64,
    leverage: f64,
    open_time: DateTime<Utc>,
    is_closed: bool,
    trail_atr_mult: Option<f64>,
    atr_value: Option<f64>,
    r_multiple: Option<f64>,
    trailing_active: bool,
    trailing_offset: Option<f64>,
    best_price: f64,
    entry_fee_total: f64,
    entry_fee_remaining: f64,
    realized_fees: f64,
    risk_amount: f64,
    risk_amount_remaining: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    position_id: String,
    #[sqlx(flatten)]
    target: TpTargetRecord,
}

impl PositionRow {
    fn into_record(self, targets: Vec<TpTargetRecord>) -> Result<PositionRecord> {
        let side: Side = self
            .side
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid side on position {}", self.id))?;

        Ok(PositionRecord {
            id: self.id,
            session_id: self.session_id,
            symbol: self.symbol,
            side,
            qty: self.qty,
            original_qty: self.original_qty,
            entry_price: self.entry_price,
            sl: self.sl,
            tp: self.tp,
            leverage: self.leverage,
            open_time: self.open_time,
            is_closed: self.is_closed,
            trail_atr_mult: self.trail_atr_mult,
            atr_value: self.atr_value,
            r_multiple: self.r_multiple,
            trailing_active: self.trailing_active,
            trailing_offset: self.trailing_offset,
            best_price: self.best_price,
            entry_fee_total: self.entry_fee_total,
            entry_fee_remaining: self.entry_fee_remaining,
            realized_fees: self.realized_fees,
            risk_amount: self.risk_amount,
            risk_amount_remaining: self.risk_amount_remaining,
            targets,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open positions of a session, targets ordered by sort order.
    ///
    /// # Errors
    /// Returns an error if a query fails or a stored side is invalid.
    pub async fn open_for_session(&self, session_id: &str) -> Result<Vec<PositionRecord>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, session_id, symbol, side, qty, original_qty, entry_price, sl, tp,
                   leverage, open_time, is_closed, trail_atr_mult, atr_value, r_multiple,
                   trailing_active, trailing_offset, best_price, entry_fee_total,
                   entry_fee_remaining, realized_fees, risk_amount, risk_amount_remaining
            FROM positions
            WHERE session_id = $1 AND NOT is_closed
            ORDER BY open_time ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query open positions")?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let target_rows = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT position_id, sort_order, price, ratio, target_qty, filled_qty, hit, label
            FROM position_tp_targets
            WHERE position_id = ANY($1)
            ORDER BY sort_order ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query take-profit targets")?;

        let mut by_position: HashMap<String, Vec<TpTargetRecord>> = HashMap::new();
        for row in target_rows {
            by_position.entry(row.position_id).or_default().push(row.target);
        }

        rows.into_iter()
            .map(|row| {
                let targets = by_position.remove(&row.id).unwrap_or_default();
                row.into_record(targets)
            })
            .collect()
    }

    /// Inserts a new position and its ladder.
    ///
    /// # Errors
    /// Returns an error if any insert fails.
    pub async fn insert(conn: &mut PgConnection, position: &PositionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (id, session_id, symbol, side, qty, original_qty, entry_price, sl, tp, leverage,
                 open_time, is_closed, trail_atr_mult, atr_value, r_multiple, trailing_active,
                 trailing_offset, best_price, entry_fee_total, entry_fee_remaining,
                 realized_fees, risk_amount, risk_amount_remaining)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(&position.id)
        .bind(&position.session_id)
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.qty)
        .bind(position.original_qty)
        .bind(position.entry_price)
        .bind(position.sl)
        .bind(position.tp)
        .bind(position.leverage)
        .bind(position.open_time)
        .bind(position.is_closed)
        .bind(position.trail_atr_mult)
        .bind(position.atr_value)
        .bind(position.r_multiple)
        .bind(position.trailing_active)
        .bind(position.trailing_offset)
        .bind(position.best_price)
        .bind(position.entry_fee_total)
        .bind(position.entry_fee_remaining)
        .bind(position.realized_fees)
        .bind(position.risk_amount)
        .bind(position.risk_amount_remaining)
        .execute(&mut *conn)
        .await
        .context("Failed to insert position")?;

        for target in &position.targets {
            sqlx::query(
                r#"
                INSERT INTO position_tp_targets
                    (id, position_id, sort_order, price, ratio, target_qty, filled_qty, hit, label)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&position.id)
            .bind(target.sort_order)
            .bind(target.price)
            .bind(target.ratio)
            .bind(target.target_qty)
            .bind(target.filled_qty)
            .bind(target.hit)
            .bind(&target.label)
            .execute(&mut *conn)
            .await
            .context("Failed to insert take-profit target")?;
        }

        Ok(())
    }

    /// Writes simulator-mutated fields of an existing position and the fill
    /// progress of its ladder.
    ///
    /// # Errors
    /// Returns an error if the position does not exist or an update fails.
    pub async fn update(conn: &mut PgConnection, position: &PositionRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET qty = $2, sl = $3, tp = $4, is_closed = $5, trailing_active = $6,
                trailing_offset = $7, best_price = $8, entry_fee_remaining = $9,
                realized_fees = $10, risk_amount_remaining = $11, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&position.id)
        .bind(position.qty)
        .bind(position.sl)
        .bind(position.tp)
        .bind(position.is_closed)
        .bind(position.trailing_active)
        .bind(position.trailing_offset)
        .bind(position.best_price)
        .bind(position.entry_fee_remaining)
        .bind(position.realized_fees)
        .bind(position.risk_amount_remaining)
        .execute(&mut *conn)
        .await
        .context("Failed to update position")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("unknown position {}", position.id);
        }

        for target in &position.targets {
            sqlx::query(
                r#"
                UPDATE position_tp_targets
                SET filled_qty = $3, hit = $4
                WHERE position_id = $1 AND sort_order = $2
                "#,
            )
            .bind(&position.id)
            .bind(target.sort_order)
            .bind(target.filled_qty)
            .bind(target.hit)
            .execute(&mut *conn)
            .await
            .context("Failed to update take-profit target")?;
        }

        Ok(())
    }
}
