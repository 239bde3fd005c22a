//! Entry sizing and profitability filter.

use momentum_core::{Side, TpLevel};
use momentum_strategy::{EffectiveConfig, StrategySignal};
use thiserror::Error;

/// Ladder share below this is treated as fully assigned.
const REMAINING_EPSILON: f64 = 1e-6;

/// Reasons a signal does not become a position. These are expected
/// outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingRejection {
    #[error("stop distance {0} is not positive")]
    InvalidStopDistance(f64),

    #[error("equity {0} is not positive")]
    NoEquity(f64),

    #[error("computed quantity {0} is not positive")]
    ZeroQuantity(f64),

    #[error("estimated profit {estimated:.4} below minimum {minimum}")]
    BelowMinProfit { estimated: f64, minimum: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySizing {
    pub qty: f64,
    /// Stop distance × qty × leverage.
    pub risk_amount: f64,
}

/// Converts a taker fee given in percent into a fraction. Values already
/// at or below 1% are taken as fractions.
#[must_use]
pub fn normalize_fee(rate: f64) -> f64 {
    if rate.is_nan() || rate <= 0.0 {
        0.0
    } else if rate > 0.01 {
        rate / 100.0
    } else {
        rate
    }
}

/// Net profit if every ladder level fills, after entry and exit fees.
#[must_use]
pub fn estimated_profit(
    side: Side,
    entry_price: f64,
    leverage: f64,
    qty: f64,
    targets: &[TpLevel],
    fee_rate: f64,
) -> f64 {
    let mut net = -(entry_price * qty * fee_rate);
    let mut remaining = 1.0_f64;

    for target in targets {
        let ratio = target.ratio.min(remaining);
        if target.price <= 0.0 || ratio <= 0.0 {
            continue;
        }
        let distance = (target.price - entry_price) * side.direction();
        if distance <= 0.0 {
            continue;
        }
        net += distance * leverage * qty * ratio - target.price * qty * ratio * fee_rate;
        remaining -= ratio;
        if remaining <= REMAINING_EPSILON {
            break;
        }
    }
    net
}

/// Sizes an entry so that hitting the stop loses `risk_per_trade` of
/// equity, capped by the notional limit and filtered by minimum profit.
///
/// # Errors
/// Returns the [`SizingRejection`] explaining why no position is opened.
pub fn size_entry(
    signal: &StrategySignal,
    equity: f64,
    leverage: f64,
    config: &EffectiveConfig,
    fee_rate: f64,
) -> Result<EntrySizing, SizingRejection> {
    let stop_distance = signal.stop_distance();
    if stop_distance <= 0.0 {
        return Err(SizingRejection::InvalidStopDistance(stop_distance));
    }
    if equity <= 0.0 {
        return Err(SizingRejection::NoEquity(equity));
    }

    let mut qty = equity * config.risk_per_trade / (stop_distance * leverage);
    let max_notional = config.max_notional_usdt;
    if max_notional > 0.0 && signal.entry_price * qty > max_notional {
        qty = max_notional / signal.entry_price;
    }
    if !qty.is_finite() || qty <= 0.0 {
        return Err(SizingRejection::ZeroQuantity(qty));
    }

    let min_profit = config.min_profit_usdt;
    if min_profit > 0.0 {
        let estimated = estimated_profit(
            signal.side,
            signal.entry_price,
            leverage,
            qty,
            &signal.tp_targets,
            fee_rate,
        );
        if estimated < min_profit {
            return Err(SizingRejection::BelowMinProfit {
                estimated,
                minimum: min_profit,
            });
        }
    }

    Ok(EntrySizing {
        qty,
        risk_amount: stop_distance * qty * leverage,
    })
}
