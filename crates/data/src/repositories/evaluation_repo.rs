//! Signal evaluation audit trail.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::EvaluationRecord;

#[derive(Debug, Clone, Copy)]
pub struct EvaluationRepository;

impl EvaluationRepository {
    /// Inserts an evaluation with all of its condition checks.
    ///
    /// # Errors
    /// Returns an error if any insert fails.
    pub async fn insert(conn: &mut PgConnection, evaluation: &EvaluationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_evaluations
                (id, session_id, candle_id, symbol, result, close_price, rsi_value, atr_value,
                 ema_fast_value, ema_slow_value, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&evaluation.id)
        .bind(&evaluation.session_id)
        .bind(&evaluation.candle_id)
        .bind(&evaluation.symbol)
        .bind(&evaluation.result)
        .bind(evaluation.close_price)
        .bind(evaluation.rsi_value)
        .bind(evaluation.atr_value)
        .bind(evaluation.ema_fast_value)
        .bind(evaluation.ema_slow_value)
        .bind(evaluation.created_at)
        .execute(&mut *conn)
        .await
        .context("Failed to insert signal evaluation")?;

        for check in &evaluation.checks {
            sqlx::query(
                r#"
                INSERT INTO signal_condition_checks
                    (id, evaluation_id, side, condition_name, expected_value, actual_value, passed)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&evaluation.id)
            .bind(&check.side)
            .bind(&check.condition_name)
            .bind(&check.expected_value)
            .bind(&check.actual_value)
            .bind(check.passed)
            .execute(&mut *conn)
            .await
            .context("Failed to insert condition check")?;
        }

        Ok(())
    }
}
