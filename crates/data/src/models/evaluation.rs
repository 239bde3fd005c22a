//! Signal evaluation audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome and market snapshot of one evaluation, signal or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: String,
    pub session_id: String,
    pub candle_id: String,
    pub symbol: String,
    /// `SIGNAL_LONG`, `SIGNAL_SHORT` or `REJECTED`.
    pub result: String,
    pub close_price: f64,
    pub rsi_value: f64,
    pub atr_value: f64,
    pub ema_fast_value: f64,
    pub ema_slow_value: f64,
    pub created_at: DateTime<Utc>,
    pub checks: Vec<ConditionCheckRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConditionCheckRecord {
    pub side: String,
    pub condition_name: String,
    pub expected_value: String,
    pub actual_value: String,
    pub passed: bool,
}
