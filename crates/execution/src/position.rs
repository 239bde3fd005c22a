use chrono::{DateTime, Utc};
use momentum_core::{Side, TpLevel};
use std::fmt;

/// One level of a position's take-profit ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTpTarget {
    pub index: usize,
    pub price: f64,
    /// Fraction of the original quantity assigned to this level.
    pub ratio: f64,
    pub qty: f64,
    pub filled_qty: f64,
    pub hit: bool,
    pub label: Option<String>,
}

impl SimTpTarget {
    #[must_use]
    pub fn remaining_qty(&self) -> f64 {
        (self.qty - self.filled_qty).max(0.0)
    }
}

/// An open simulated position.
#[derive(Debug, Clone, PartialEq)]
pub struct SimPosition {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub original_qty: f64,
    pub entry_price: f64,
    pub sl: f64,
    pub tp: f64,
    pub leverage: f64,
    pub open_time: DateTime<Utc>,
    pub tp_targets: Vec<SimTpTarget>,
    pub trail_atr_mult: Option<f64>,
    pub atr_value: Option<f64>,
    pub r_multiple: Option<f64>,
    pub trailing_active: bool,
    pub trailing_offset: Option<f64>,
    /// Best price since entry, or since trailing was armed.
    pub best_price: f64,
    pub entry_fee_total: f64,
    pub entry_fee_remaining: f64,
    pub realized_fees: f64,
    pub risk_amount: f64,
    pub risk_amount_remaining: f64,
}

impl SimPosition {
    /// Unrealized `PnL` at `price`, before fees.
    #[must_use]
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.qty * self.leverage * self.side.direction()
    }

    pub(crate) fn next_target_mut(&mut self) -> Option<&mut SimTpTarget> {
        self.tp_targets.iter_mut().find(|t| !t.hit && t.qty > 0.0)
    }

    pub(crate) fn next_target_price(&self) -> Option<f64> {
        self.tp_targets
            .iter()
            .find(|t| !t.hit && t.qty > 0.0)
            .map(|t| t.price)
    }
}

/// Parameters for opening a position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPositionSpec {
    /// Explicit id; a `sim-{symbol}-{ms}-{n}` id is generated when `None`.
    pub id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_price: f64,
    pub leverage: f64,
    pub sl: f64,
    pub tp: f64,
    pub open_time: DateTime<Utc>,
    pub tp_targets: Vec<TpLevel>,
    pub trail_atr_mult: Option<f64>,
    pub atr_value: Option<f64>,
    pub r_multiple: Option<f64>,
    pub risk_amount: f64,
}

/// Why a quantity was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// A ladder level filled. `index` is zero-based.
    Target { index: usize, label: Option<String> },
    TakeProfit,
    StopLoss,
    TrailingStop,
    ForceClose,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target {
                label: Some(label), ..
            } => f.write_str(label),
            Self::Target { index, label: None } => write!(f, "tp_target_{}", index + 1),
            Self::TakeProfit => f.write_str("take_profit"),
            Self::StopLoss => f.write_str("stop_loss"),
            Self::TrailingStop => f.write_str("trailing_stop"),
            Self::ForceClose => f.write_str("force_close"),
        }
    }
}

/// Immutable record of a realized close.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTrade {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: f64,
    pub leverage: f64,
    pub sl: f64,
    pub tp: f64,
    /// Net of fees.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub risk_amount: f64,
    pub reason: CloseReason,
    pub is_partial: bool,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_labels() {
        let labelled = CloseReason::Target {
            index: 0,
            label: Some("TP1".into()),
        };
        assert_eq!(labelled.to_string(), "TP1");
        let unlabelled = CloseReason::Target {
            index: 2,
            label: None,
        };
        assert_eq!(unlabelled.to_string(), "tp_target_3");
        assert_eq!(CloseReason::TrailingStop.to_string(), "trailing_stop");
        assert_eq!(CloseReason::ForceClose.to_string(), "force_close");
    }
}
