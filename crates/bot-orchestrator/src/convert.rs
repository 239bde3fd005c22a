//! Mapping between simulator state and persisted records.

use chrono::{DateTime, Utc};
use momentum_data::{
    ConditionCheckRecord, EvaluationRecord, PositionRecord, TpTargetRecord, TradeRecord,
};
use momentum_execution::{SimPosition, SimTpTarget, SimTrade};
use momentum_strategy::{EvaluationOutput, EvaluationResult};
use uuid::Uuid;

/// Rebuilds a simulator position. Targets must already be ordered by
/// sort order; the sort order becomes the ladder index.
#[must_use]
pub fn sim_position(record: &PositionRecord) -> SimPosition {
    SimPosition {
        id: record.id.clone(),
        symbol: record.symbol.clone(),
        side: record.side,
        qty: record.qty,
        original_qty: record.original_qty,
        entry_price: record.entry_price,
        sl: record.sl,
        tp: record.tp,
        leverage: record.leverage,
        open_time: record.open_time,
        tp_targets: record
            .targets
            .iter()
            .enumerate()
            .map(|(i, t)| SimTpTarget {
                index: usize::try_from(t.sort_order).unwrap_or(i),
                price: t.price,
                ratio: t.ratio,
                qty: t.target_qty,
                filled_qty: t.filled_qty,
                hit: t.hit,
                label: t.label.clone(),
            })
            .collect(),
        trail_atr_mult: record.trail_atr_mult,
        atr_value: record.atr_value,
        r_multiple: record.r_multiple,
        trailing_active: record.trailing_active,
        trailing_offset: record.trailing_offset,
        best_price: record.best_price,
        entry_fee_total: record.entry_fee_total,
        entry_fee_remaining: record.entry_fee_remaining,
        realized_fees: record.realized_fees,
        risk_amount: record.risk_amount,
        risk_amount_remaining: record.risk_amount_remaining,
    }
}

#[must_use]
pub fn position_record(session_id: &str, position: &SimPosition) -> PositionRecord {
    PositionRecord {
        id: position.id.clone(),
        session_id: session_id.to_string(),
        symbol: position.symbol.clone(),
        side: position.side,
        qty: position.qty,
        original_qty: position.original_qty,
        entry_price: position.entry_price,
        sl: position.sl,
        tp: position.tp,
        leverage: position.leverage,
        open_time: position.open_time,
        is_closed: false,
        trail_atr_mult: position.trail_atr_mult,
        atr_value: position.atr_value,
        r_multiple: position.r_multiple,
        trailing_active: position.trailing_active,
        trailing_offset: position.trailing_offset,
        best_price: position.best_price,
        entry_fee_total: position.entry_fee_total,
        entry_fee_remaining: position.entry_fee_remaining,
        realized_fees: position.realized_fees,
        risk_amount: position.risk_amount,
        risk_amount_remaining: position.risk_amount_remaining,
        targets: position
            .tp_targets
            .iter()
            .map(|t| TpTargetRecord {
                sort_order: i32::try_from(t.index).unwrap_or(i32::MAX),
                price: t.price,
                ratio: t.ratio,
                target_qty: t.qty,
                filled_qty: t.filled_qty,
                hit: t.hit,
                label: t.label.clone(),
            })
            .collect(),
    }
}

/// Marks a stored position as fully closed.
#[must_use]
pub fn closed_record(mut record: PositionRecord) -> PositionRecord {
    record.is_closed = true;
    record.qty = 0.0;
    record
}

#[must_use]
pub fn trade_record(session_id: &str, trade: &SimTrade) -> TradeRecord {
    TradeRecord {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        position_id: trade.position_id.clone(),
        symbol: trade.symbol.clone(),
        side: trade.side,
        entry_price: trade.entry_price,
        exit_price: trade.exit_price,
        qty: trade.qty,
        leverage: trade.leverage,
        sl: trade.sl,
        tp: trade.tp,
        pnl: trade.pnl,
        pnl_pct: trade.pnl_pct,
        fees: trade.fees,
        risk_amount: trade.risk_amount,
        open_time: trade.open_time,
        close_time: trade.close_time,
        reason: trade.reason.to_string(),
        is_partial: trade.is_partial,
    }
}

#[must_use]
pub fn evaluation_record(
    session_id: &str,
    candle_id: &str,
    symbol: &str,
    output: &EvaluationOutput,
    created_at: DateTime<Utc>,
) -> EvaluationRecord {
    EvaluationRecord {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        candle_id: candle_id.to_string(),
        symbol: symbol.to_string(),
        result: EvaluationResult::from(output).as_str().to_string(),
        close_price: output.snapshot.close_price,
        rsi_value: output.snapshot.rsi_value,
        atr_value: output.snapshot.atr_value,
        ema_fast_value: output.snapshot.ema_fast_value,
        ema_slow_value: output.snapshot.ema_slow_value,
        created_at,
        checks: output
            .checks
            .iter()
            .map(|c| ConditionCheckRecord {
                side: c.side.as_str().to_string(),
                condition_name: c.condition_name.clone(),
                expected_value: c.expected_value.clone(),
                actual_value: c.actual_value.clone(),
                passed: c.passed,
            })
            .collect(),
    }
}
