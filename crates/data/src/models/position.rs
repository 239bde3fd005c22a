use chrono::{DateTime, Utc};
use momentum_core::Side;
use serde::{Deserialize, Serialize};

/// Persisted state of a simulated position, including its ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: String,
    pub session_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub original_qty: f64,
    pub entry_price: f64,
    pub sl: f64,
    pub tp: f64,
    pub leverage: f64,
    pub open_time: DateTime<Utc>,
    pub is_closed: bool,
    pub trail_atr_mult: Option<f64>,
    pub atr_value: Option<f64>,
    pub r_multiple: Option<f64>,
    pub trailing_active: bool,
    pub trailing_offset: Option<f64>,
    pub best_price: f64,
    pub entry_fee_total: f64,
    pub entry_fee_remaining: f64,
    pub realized_fees: f64,
    pub risk_amount: f64,
    pub risk_amount_remaining: f64,
    /// Ordered by `sort_order`.
    pub targets: Vec<TpTargetRecord>,
}

/// One ladder level, unique per (position, sort order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TpTargetRecord {
    pub sort_order: i32,
    pub price: f64,
    pub ratio: f64,
    pub target_qty: f64,
    pub filled_qty: f64,
    pub hit: bool,
    pub label: Option<String>,
}
