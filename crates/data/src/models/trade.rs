use chrono::{DateTime, Utc};
use momentum_core::Side;
use serde::{Deserialize, Serialize};

/// A realized partial or full close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub session_id: String,
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: f64,
    pub leverage: f64,
    pub sl: f64,
    pub tp: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub risk_amount: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    /// Target label, `tp_target_{n}`, `take_profit`, `stop_loss`,
    /// `trailing_stop` or `force_close`.
    pub reason: String,
    pub is_partial: bool,
}
