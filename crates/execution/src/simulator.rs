//! Per-session position ledger.
//!
//! The simulator advances every open position on each closed bar: ladder
//! fills first, then the trailing-stop ratchet, then stop/target exits.
//! Fills are modelled at the level price; this is not a matching engine.

use crate::position::{CloseReason, OpenPositionSpec, SimPosition, SimTpTarget, SimTrade};
use chrono::{DateTime, Utc};
use momentum_core::{Bar, Side, TpLevel};
use tracing::debug;

/// Quantities within this distance of zero are treated as fully closed.
const QTY_EPSILON: f64 = 1e-10;
/// Unassigned ladder share above this gets its own level at the final tp.
const RATIO_EPSILON: f64 = 1e-6;

/// Taker fee model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeConfig {
    /// Fraction of notional charged on entry and on each exit.
    pub taker_rate: f64,
    /// Minimum total fee of a full round trip, pro-rated by closed fraction.
    pub min_fee: f64,
}

impl FeeConfig {
    #[must_use]
    pub fn new(taker_rate: f64, min_fee: f64) -> Self {
        Self {
            taker_rate: taker_rate.max(0.0),
            min_fee: min_fee.max(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionSimulator {
    balance: f64,
    equity: f64,
    open_positions: Vec<SimPosition>,
    closed_trades: Vec<SimTrade>,
    fees: FeeConfig,
    position_counter: u64,
}

impl PositionSimulator {
    #[must_use]
    pub fn new(starting_balance: f64, fees: FeeConfig) -> Self {
        Self {
            balance: starting_balance,
            equity: starting_balance,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            fees: FeeConfig::new(fees.taker_rate, fees.min_fee),
            position_counter: 0,
        }
    }

    #[must_use]
    pub const fn balance(&self) -> f64 {
        self.balance
    }

    /// Balance plus unrealized `PnL` net of reserved entry fees, as of the
    /// last processed price.
    #[must_use]
    pub const fn equity(&self) -> f64 {
        self.equity
    }

    #[must_use]
    pub fn open_positions(&self) -> &[SimPosition] {
        &self.open_positions
    }

    #[must_use]
    pub fn closed_trades(&self) -> &[SimTrade] {
        &self.closed_trades
    }

    #[must_use]
    pub const fn fees(&self) -> FeeConfig {
        self.fees
    }

    /// Re-inserts a persisted position as-is.
    pub fn restore_position(&mut self, position: SimPosition) {
        self.open_positions.push(position);
    }

    /// Opens a new position, charging the entry fee against its reserve.
    pub fn open_position(&mut self, spec: OpenPositionSpec) -> &SimPosition {
        self.position_counter += 1;
        let id = spec.id.unwrap_or_else(|| {
            format!(
                "sim-{}-{}-{}",
                spec.symbol,
                spec.open_time.timestamp_millis(),
                self.position_counter
            )
        });

        let trailing_offset = match (spec.trail_atr_mult, spec.atr_value) {
            (Some(mult), Some(atr)) => Some((mult * atr).max(0.0)),
            _ => None,
        };

        let targets = normalize_targets(spec.qty, spec.tp, &spec.tp_targets);
        let final_tp = targets.last().map_or(spec.tp, |t| t.price);

        let min_entry_fee = if self.fees.min_fee > 0.0 {
            self.fees.min_fee * 0.5
        } else {
            0.0
        };
        let entry_fee_total = (spec.entry_price * spec.qty * self.fees.taker_rate).max(min_entry_fee);

        debug!(
            position_id = %id,
            symbol = %spec.symbol,
            side = %spec.side,
            qty = spec.qty,
            entry = spec.entry_price,
            levels = targets.len(),
            "simulated position opened"
        );

        let index = self.open_positions.len();
        self.open_positions.push(SimPosition {
            id,
            symbol: spec.symbol,
            side: spec.side,
            qty: spec.qty,
            original_qty: spec.qty,
            entry_price: spec.entry_price,
            sl: spec.sl,
            tp: final_tp,
            leverage: spec.leverage,
            open_time: spec.open_time,
            tp_targets: targets,
            trail_atr_mult: spec.trail_atr_mult,
            atr_value: spec.atr_value,
            r_multiple: spec.r_multiple,
            trailing_active: false,
            trailing_offset,
            best_price: spec.entry_price,
            entry_fee_total,
            entry_fee_remaining: entry_fee_total,
            realized_fees: 0.0,
            risk_amount: spec.risk_amount,
            risk_amount_remaining: spec.risk_amount,
        });
        &self.open_positions[index]
    }

    /// Advances every open position to `bar.close` and returns the trades
    /// realized on this bar.
    pub fn on_new_candle(&mut self, bar: &Bar) -> Vec<SimTrade> {
        let price = bar.close;
        let now = bar.open_time;
        let mut realized = Vec::new();
        let positions = std::mem::take(&mut self.open_positions);
        let mut remaining = Vec::with_capacity(positions.len());

        for mut pos in positions {
            if pos.best_price == 0.0 {
                pos.best_price = pos.entry_price;
            }
            pos.best_price = match pos.side {
                Side::Long => pos.best_price.max(price),
                Side::Short => pos.best_price.min(price),
            };

            let mut done = self.fill_ladder(&mut pos, price, now, &mut realized);

            if !done && pos.trailing_active {
                ratchet_trailing_stop(&mut pos, price);
            }

            if !done {
                if let Some((reason, exit_price)) = check_exit(&pos, price) {
                    let qty = pos.qty;
                    let (trade, full) = self.close_part(&mut pos, exit_price, now, qty, reason);
                    realized.push(trade);
                    done = full;
                }
            }

            if !done {
                remaining.push(pos);
            }
        }

        self.open_positions = remaining;
        self.update_equity(price);
        realized
    }

    /// Closes every open position at `price`.
    pub fn force_close_all(&mut self, price: f64, ts: DateTime<Utc>) -> Vec<SimTrade> {
        let positions = std::mem::take(&mut self.open_positions);
        let mut realized = Vec::with_capacity(positions.len());
        for mut pos in positions {
            let qty = pos.qty;
            let (trade, _) = self.close_part(&mut pos, price, ts, qty, CloseReason::ForceClose);
            realized.push(trade);
        }
        self.update_equity(price);
        realized
    }

    /// Walks the ladder front to back. Returns `true` when the position was
    /// fully closed.
    fn fill_ladder(
        &mut self,
        pos: &mut SimPosition,
        price: f64,
        now: DateTime<Utc>,
        realized: &mut Vec<SimTrade>,
    ) -> bool {
        loop {
            let side = pos.side;
            let Some(target) = pos.next_target_mut() else {
                return false;
            };
            let touched = target.price > 0.0
                && match side {
                    Side::Long => price >= target.price,
                    Side::Short => price <= target.price,
                };
            if !touched {
                return false;
            }

            let target_remaining = target.remaining_qty();
            if target_remaining <= 0.0 {
                target.hit = true;
                update_tp(pos);
                continue;
            }
            let index = target.index;
            let exit_price = target.price;
            let reason = CloseReason::Target {
                index,
                label: target.label.clone(),
            };

            let qty = pos.qty.min(target_remaining);
            if qty <= 0.0 {
                return false;
            }

            let (trade, full) = self.close_part(pos, exit_price, now, qty, reason);
            realized.push(trade);
            if let Some(target) = pos.tp_targets.iter_mut().find(|t| t.index == index) {
                mark_progress(target, qty);
            }

            if index == 0 {
                pos.sl = pos.entry_price;
                activate_trailing(pos, price);
            }
            update_tp(pos);

            if full {
                return true;
            }
        }
    }

    /// Realizes `qty` of `pos` at `exit_price`. Returns the trade and
    /// whether the position is now flat.
    fn close_part(
        &mut self,
        pos: &mut SimPosition,
        exit_price: f64,
        close_time: DateTime<Utc>,
        qty: f64,
        reason: CloseReason,
    ) -> (SimTrade, bool) {
        let q = qty.min(pos.qty);
        let dir = pos.side.direction();
        let gross = (exit_price - pos.entry_price) * q * pos.leverage * dir;
        let fraction = if pos.original_qty > 0.0 {
            (q / pos.original_qty).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let mut entry_share = 0.0;
        if pos.original_qty > 0.0 && pos.entry_fee_total > 0.0 {
            entry_share = pos.entry_fee_total * fraction;
            pos.entry_fee_remaining = (pos.entry_fee_remaining - entry_share).max(0.0);
        }
        let exit_fee = exit_price * q * self.fees.taker_rate;
        let mut total_fees = entry_share + exit_fee;
        if self.fees.min_fee > 0.0 {
            let floor = self.fees.min_fee * fraction;
            if total_fees < floor {
                total_fees = floor;
            }
        }

        let net = gross - total_fees;
        pos.realized_fees += total_fees;
        self.balance += net;

        let notional = pos.entry_price * q * pos.leverage;
        let pnl_pct = if notional > 0.0 {
            net / notional * 100.0
        } else {
            0.0
        };
        let full = q >= pos.qty - QTY_EPSILON;

        let mut risk_share = 0.0;
        if pos.risk_amount > 0.0 && pos.original_qty > 0.0 {
            risk_share = pos.risk_amount_remaining.min(pos.risk_amount * fraction);
            pos.risk_amount_remaining = (pos.risk_amount_remaining - risk_share).max(0.0);
        }

        let trade = SimTrade {
            position_id: pos.id.clone(),
            symbol: pos.symbol.clone(),
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price,
            qty: q,
            leverage: pos.leverage,
            sl: pos.sl,
            tp: pos.tp,
            pnl: net,
            pnl_pct,
            fees: total_fees,
            risk_amount: risk_share,
            reason,
            is_partial: !full,
            open_time: pos.open_time,
            close_time,
        };
        debug!(
            position_id = %trade.position_id,
            reason = %trade.reason,
            qty = q,
            exit = exit_price,
            pnl = net,
            partial = !full,
            "simulated close"
        );
        self.closed_trades.push(trade.clone());
        pos.qty = if full { 0.0 } else { pos.qty - q };
        (trade, full)
    }

    fn update_equity(&mut self, price: f64) {
        let unrealized: f64 = self
            .open_positions
            .iter()
            .map(|p| p.unrealized_pnl(price) - p.entry_fee_remaining)
            .sum();
        self.equity = self.balance + unrealized;
    }
}

/// Builds the position ladder from requested levels.
///
/// Levels with non-positive price or ratio are skipped, ratios are capped
/// at the share still unassigned, any leftover becomes a final level at
/// `tp`, and an empty ladder becomes a single level at `tp`.
fn normalize_targets(qty: f64, tp: f64, levels: &[TpLevel]) -> Vec<SimTpTarget> {
    let mut out: Vec<SimTpTarget> = Vec::with_capacity(levels.len() + 1);
    let mut remaining = 1.0_f64;

    for (index, level) in levels.iter().enumerate() {
        if level.price <= 0.0 || level.ratio <= 0.0 || remaining <= 0.0 {
            continue;
        }
        let ratio = level.ratio.min(remaining);
        out.push(SimTpTarget {
            index,
            price: level.price,
            ratio,
            qty: 0.0,
            filled_qty: 0.0,
            hit: false,
            label: level.label.clone(),
        });
        remaining = (remaining - ratio).max(0.0);
    }

    if !out.is_empty() && remaining > RATIO_EPSILON {
        out.push(SimTpTarget {
            index: out.len(),
            price: tp,
            ratio: remaining,
            qty: 0.0,
            filled_qty: 0.0,
            hit: false,
            label: None,
        });
    }
    if out.is_empty() {
        out.push(SimTpTarget {
            index: 0,
            price: tp,
            ratio: 1.0,
            qty: 0.0,
            filled_qty: 0.0,
            hit: false,
            label: None,
        });
    }

    for t in &mut out {
        t.qty = (qty * t.ratio).max(0.0);
        if t.qty <= 0.0 {
            t.hit = true;
        }
    }
    out
}

fn mark_progress(target: &mut SimTpTarget, qty: f64) {
    target.filled_qty = target.qty.min(target.filled_qty + qty.max(0.0));
    if target.qty <= 0.0 || target.filled_qty >= target.qty - QTY_EPSILON {
        target.hit = true;
    }
}

fn update_tp(pos: &mut SimPosition) {
    if let Some(price) = pos.next_target_price() {
        pos.tp = price;
    }
}

fn activate_trailing(pos: &mut SimPosition, price: f64) {
    if pos.trailing_active {
        return;
    }
    if let Some(offset) = pos.trailing_offset.filter(|o| *o > 0.0) {
        debug!(position_id = %pos.id, offset, "trailing stop armed");
        pos.trailing_active = true;
        pos.best_price = price;
    }
}

/// Tightens the stop toward the best price; never loosens it and never
/// moves it past break-even on the losing side.
fn ratchet_trailing_stop(pos: &mut SimPosition, price: f64) {
    let Some(offset) = pos.trailing_offset else {
        return;
    };
    match pos.side {
        Side::Long => {
            pos.best_price = pos.best_price.max(price);
            let candidate = (pos.best_price - offset).max(pos.entry_price);
            if candidate > pos.sl {
                pos.sl = candidate;
            }
        }
        Side::Short => {
            pos.best_price = pos.best_price.min(price);
            let candidate = (pos.best_price + offset).min(pos.entry_price);
            if candidate < pos.sl {
                pos.sl = candidate;
            }
        }
    }
}

fn check_exit(pos: &SimPosition, price: f64) -> Option<(CloseReason, f64)> {
    let stop_reason = |beyond_entry: bool| {
        if pos.trailing_active && beyond_entry {
            CloseReason::TrailingStop
        } else {
            CloseReason::StopLoss
        }
    };
    match pos.side {
        Side::Long if price <= pos.sl => Some((stop_reason(pos.sl >= pos.entry_price), pos.sl)),
        Side::Long if price >= pos.tp => Some((CloseReason::TakeProfit, pos.tp)),
        Side::Short if price >= pos.sl => Some((stop_reason(pos.sl <= pos.entry_price), pos.sl)),
        Side::Short if price <= pos.tp => Some((CloseReason::TakeProfit, pos.tp)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn bar(i: i64, close: f64) -> Bar {
        Bar {
            open_time: t0() + Duration::minutes(5 * i),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn level(price: f64, ratio: f64, label: &str) -> TpLevel {
        TpLevel {
            price,
            ratio,
            label: Some(label.to_string()),
        }
    }

    fn long_spec() -> OpenPositionSpec {
        OpenPositionSpec {
            id: None,
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            qty: 10.0,
            entry_price: 100.0,
            leverage: 1.0,
            sl: 95.0,
            tp: 106.0,
            open_time: t0(),
            tp_targets: vec![
                level(102.0, 0.4, "TP1"),
                level(104.0, 0.35, "TP2"),
                level(106.0, 0.25, "TP3"),
            ],
            trail_atr_mult: Some(1.0),
            atr_value: Some(2.0),
            r_multiple: Some(5.0),
            risk_amount: 50.0,
        }
    }

    fn short_spec() -> OpenPositionSpec {
        OpenPositionSpec {
            side: Side::Short,
            sl: 105.0,
            tp: 94.0,
            tp_targets: vec![level(98.0, 0.5, "TP1"), level(94.0, 0.5, "TP2")],
            ..long_spec()
        }
    }

    #[test]
    fn test_open_position_normalizes_ladder_and_charges_entry_fee() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::new(0.0006, 1.5));
        let pos = sim.open_position(long_spec()).clone();

        assert_eq!(pos.id, format!("sim-BTCUSDT-{}-1", t0().timestamp_millis()));
        let total: f64 = pos.tp_targets.iter().map(|t| t.ratio).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!((pos.tp_targets[0].qty - 4.0).abs() < 1e-12);
        assert_eq!(pos.tp, 106.0);
        assert_eq!(pos.trailing_offset, Some(2.0));
        // 100 * 10 * 0.0006 = 0.6 < min fee / 2
        assert_eq!(pos.entry_fee_total, 0.75);
        assert_eq!(pos.entry_fee_remaining, 0.75);
        assert_eq!(pos.best_price, 100.0);
    }

    #[test]
    fn test_ladder_leftover_and_empty_ladder() {
        let partial = normalize_targets(10.0, 110.0, &[level(105.0, 0.6, "TP1")]);
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[1].price, 110.0);
        assert!((partial[1].ratio - 0.4).abs() < 1e-12);
        assert_eq!(partial[1].label, None);

        let empty = normalize_targets(10.0, 110.0, &[level(-1.0, 0.5, "bad")]);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].ratio, 1.0);
        assert_eq!(empty[0].qty, 10.0);

        let capped = normalize_targets(
            10.0,
            110.0,
            &[level(105.0, 0.8, "TP1"), level(107.0, 0.8, "TP2")],
        );
        let total: f64 = capped.iter().map(|t| t.ratio).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_three_level_ladder_closes_full_quantity() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::new(0.0006, 0.0));
        sim.open_position(long_spec());

        let first = sim.on_new_candle(&bar(1, 102.0));
        assert_eq!(first.len(), 1);
        assert!(first[0].is_partial);
        assert_eq!(first[0].reason.to_string(), "TP1");
        let pos = &sim.open_positions()[0];
        assert_eq!(pos.sl, 100.0);
        assert!(pos.trailing_active);
        assert_eq!(pos.tp, 104.0);

        let second = sim.on_new_candle(&bar(2, 104.0));
        assert_eq!(second.len(), 1);
        assert!(second[0].is_partial);
        // best 104 - offset 2
        assert_eq!(sim.open_positions()[0].sl, 102.0);

        let third = sim.on_new_candle(&bar(3, 106.5));
        assert_eq!(third.len(), 1);
        assert!(!third[0].is_partial);
        assert_eq!(third[0].exit_price, 106.0);
        assert!(sim.open_positions().is_empty());

        let closed: f64 = sim.closed_trades().iter().map(|t| t.qty).sum();
        assert!((closed - 10.0).abs() < 1e-9);
        let risk: f64 = sim.closed_trades().iter().map(|t| t.risk_amount).sum();
        assert!((risk - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_through_several_levels_fills_in_order() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        sim.open_position(long_spec());
        let trades = sim.on_new_candle(&bar(1, 110.0));
        let reasons: Vec<String> = trades.iter().map(|t| t.reason.to_string()).collect();
        assert_eq!(reasons, vec!["TP1", "TP2", "TP3"]);
        assert!(!trades[2].is_partial);
        assert!(trades[..2].iter().all(|t| t.is_partial));
        // 4*2 + 3.5*4 + 2.5*6
        assert!((sim.balance() - (1000.0 + 8.0 + 14.0 + 15.0)).abs() < 1e-9);
    }

    #[test]
    fn test_partial_plus_remaining_equals_original() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::new(0.0006, 1.5));
        sim.open_position(long_spec());
        sim.on_new_candle(&bar(1, 102.5));
        let pos = &sim.open_positions()[0];
        let closed: f64 = sim.closed_trades().iter().map(|t| t.qty).sum();
        assert!((closed + pos.qty - pos.original_qty).abs() < 1e-9);
        assert!(pos.entry_fee_remaining <= pos.entry_fee_total);
        assert!(pos.entry_fee_remaining >= 0.0);
    }

    #[test]
    fn test_long_trailing_stop_never_decreases() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        sim.open_position(long_spec());
        sim.on_new_candle(&bar(1, 102.0));

        let path = [103.0, 103.5, 102.8, 103.9, 103.2, 103.95, 103.1];
        let mut last_sl = sim.open_positions()[0].sl;
        for (i, &price) in path.iter().enumerate() {
            sim.on_new_candle(&bar(i as i64 + 2, price));
            let Some(pos) = sim.open_positions().first() else {
                break;
            };
            assert!(pos.sl >= last_sl, "stop loosened: {} -> {}", last_sl, pos.sl);
            last_sl = pos.sl;
        }
        assert!((last_sl - 101.95).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_stop_exit_reason() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        sim.open_position(long_spec());
        sim.on_new_candle(&bar(1, 102.0));
        sim.on_new_candle(&bar(2, 103.9));
        let trades = sim.on_new_candle(&bar(3, 101.0));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reason, CloseReason::TrailingStop);
        assert!((trades[0].exit_price - 101.9).abs() < 1e-9);
        assert!(!trades[0].is_partial);
        assert!(sim.open_positions().is_empty());
    }

    #[test]
    fn test_short_trailing_stop_never_increases() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        sim.open_position(short_spec());
        let first = sim.on_new_candle(&bar(1, 98.0));
        assert_eq!(first.len(), 1);
        assert_eq!(sim.open_positions()[0].sl, 100.0);

        let path = [97.0, 97.5, 96.2, 96.9, 95.5, 96.0];
        let mut last_sl = sim.open_positions()[0].sl;
        for (i, &price) in path.iter().enumerate() {
            sim.on_new_candle(&bar(i as i64 + 2, price));
            let Some(pos) = sim.open_positions().first() else {
                break;
            };
            assert!(pos.sl <= last_sl, "stop loosened: {} -> {}", last_sl, pos.sl);
            last_sl = pos.sl;
        }
        assert!((last_sl - 97.5).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_before_any_target() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::new(0.0006, 0.0));
        sim.open_position(long_spec());
        let trades = sim.on_new_candle(&bar(1, 94.0));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reason, CloseReason::StopLoss);
        assert_eq!(trades[0].exit_price, 95.0);
        assert!(!trades[0].is_partial);
        // -5 * 10 gross, 0.6 entry + 0.57 exit fee
        assert!((trades[0].pnl - (-50.0 - 0.6 - 0.57)).abs() < 1e-9);
        assert!((sim.balance() - (1000.0 - 51.17)).abs() < 1e-9);
        assert!((sim.equity() - sim.balance()).abs() < 1e-12);
    }

    #[test]
    fn test_min_fee_floor_is_pro_rated() {
        let fees = FeeConfig::new(0.0006, 1.5);
        let mut sim = PositionSimulator::new(1000.0, fees);
        sim.open_position(OpenPositionSpec {
            qty: 0.5,
            ..long_spec()
        });
        sim.on_new_candle(&bar(1, 102.0));
        sim.on_new_candle(&bar(2, 110.0));

        for trade in sim.closed_trades() {
            let floor = fees.min_fee * trade.qty / 0.5;
            assert!(trade.fees >= floor - 1e-12, "fee {} below {}", trade.fees, floor);
        }
        let total_fees: f64 = sim.closed_trades().iter().map(|t| t.fees).sum();
        assert!(total_fees >= fees.min_fee - 1e-9);
    }

    #[test]
    fn test_equity_includes_unrealized_and_fee_reserve() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::new(0.001, 0.0));
        sim.open_position(OpenPositionSpec {
            leverage: 2.0,
            ..long_spec()
        });
        sim.on_new_candle(&bar(1, 101.0));
        // (101 - 100) * 10 * 2 - entry fee 1.0
        assert!((sim.equity() - (1000.0 + 20.0 - 1.0)).abs() < 1e-9);
        assert_eq!(sim.balance(), 1000.0);
    }

    #[test]
    fn test_force_close_all() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        sim.open_position(long_spec());
        sim.open_position(short_spec());
        let trades = sim.force_close_all(101.0, t0() + Duration::hours(1));
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.reason == CloseReason::ForceClose));
        assert!(trades.iter().all(|t| !t.is_partial));
        assert!(sim.open_positions().is_empty());
        // +10 long, -10 short
        assert!((sim.balance() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_restored_position_keeps_state() {
        let mut source = PositionSimulator::new(1000.0, FeeConfig::default());
        source.open_position(long_spec());
        source.on_new_candle(&bar(1, 102.0));
        let snapshot = source.open_positions()[0].clone();

        let mut sim = PositionSimulator::new(source.balance(), FeeConfig::default());
        sim.restore_position(snapshot.clone());
        assert_eq!(sim.open_positions()[0], snapshot);

        let trades = sim.on_new_candle(&bar(2, 104.0));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reason.to_string(), "TP2");
    }

    #[test]
    fn test_explicit_id_is_used() {
        let mut sim = PositionSimulator::new(1000.0, FeeConfig::default());
        let pos = sim.open_position(OpenPositionSpec {
            id: Some("pos-1".to_string()),
            ..long_spec()
        });
        assert_eq!(pos.id, "pos-1");
    }
}
