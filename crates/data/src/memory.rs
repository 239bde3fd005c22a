//! Process-local [`TradingStore`] for tests and dry runs.

use crate::models::{
    CandleRecord, EvaluationRecord, PositionRecord, RunningSession, TradeRecord,
};
use crate::store::{SessionCycle, TradingStore};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use momentum_core::Bar;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

type CandleKey = (String, String);

#[derive(Debug, Default)]
struct State {
    candles: HashMap<CandleKey, BTreeMap<DateTime<Utc>, CandleRecord>>,
    sessions: Vec<RunningSession>,
    positions: Vec<PositionRecord>,
    trades: Vec<TradeRecord>,
    evaluations: Vec<EvaluationRecord>,
}

/// All rows live behind one lock, so a cycle commit is atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: RunningSession) {
        self.state.write().sessions.push(session);
    }

    /// Inserts candles without going through the upsert id path.
    pub fn seed_candles(&self, symbol: &str, granularity: &str, bars: &[Bar]) {
        let mut state = self.state.write();
        let series = state
            .candles
            .entry((symbol.to_string(), granularity.to_string()))
            .or_default();
        for bar in bars {
            series.insert(
                bar.open_time,
                CandleRecord::new(Uuid::new_v4().to_string(), symbol, granularity, bar),
            );
        }
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<RunningSession> {
        self.state
            .read()
            .sessions
            .iter()
            .find(|s| s.session.id == session_id)
            .cloned()
    }

    /// All positions of a session, open or closed.
    #[must_use]
    pub fn positions(&self, session_id: &str) -> Vec<PositionRecord> {
        self.state
            .read()
            .positions
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn trades(&self, session_id: &str) -> Vec<TradeRecord> {
        self.state
            .read()
            .trades
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn evaluations(&self, session_id: &str) -> Vec<EvaluationRecord> {
        self.state
            .read()
            .evaluations
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn candle_count(&self, symbol: &str, granularity: &str) -> usize {
        self.state
            .read()
            .candles
            .get(&(symbol.to_string(), granularity.to_string()))
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl TradingStore for InMemoryStore {
    async fn upsert_candle(&self, symbol: &str, granularity: &str, bar: &Bar) -> Result<String> {
        let mut state = self.state.write();
        let series = state
            .candles
            .entry((symbol.to_string(), granularity.to_string()))
            .or_default();
        let id = series
            .get(&bar.open_time)
            .map_or_else(|| Uuid::new_v4().to_string(), |c| c.id.clone());
        series.insert(
            bar.open_time,
            CandleRecord::new(id.clone(), symbol, granularity, bar),
        );
        Ok(id)
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let state = self.state.read();
        let Some(series) = state
            .candles
            .get(&(symbol.to_string(), granularity.to_string()))
        else {
            return Ok(Vec::new());
        };
        let mut bars: Vec<Bar> = series.values().rev().take(limit).map(CandleRecord::bar).collect();
        bars.reverse();
        Ok(bars)
    }

    async fn running_sessions(&self, symbol: &str) -> Result<Vec<RunningSession>> {
        Ok(self
            .state
            .read()
            .sessions
            .iter()
            .filter(|s| {
                s.session.symbol == symbol
                    && s.session.status == crate::models::SessionStatus::Running
            })
            .cloned()
            .collect())
    }

    async fn open_positions(&self, session_id: &str) -> Result<Vec<PositionRecord>> {
        Ok(self
            .state
            .read()
            .positions
            .iter()
            .filter(|p| p.session_id == session_id && !p.is_closed)
            .cloned()
            .map(|mut p| {
                p.targets.sort_by_key(|t| t.sort_order);
                p
            })
            .collect())
    }

    async fn commit_cycle(&self, cycle: &SessionCycle) -> Result<()> {
        let mut state = self.state.write();

        let Some(session_index) = state
            .sessions
            .iter()
            .position(|s| s.session.id == cycle.session_id)
        else {
            bail!("unknown session {}", cycle.session_id);
        };
        for update in &cycle.updated {
            if !state.positions.iter().any(|p| p.id == update.id) {
                bail!("unknown position {}", update.id);
            }
        }

        for update in &cycle.updated {
            if let Some(slot) = state.positions.iter_mut().find(|p| p.id == update.id) {
                *slot = update.clone();
            }
        }
        state.positions.extend(cycle.opened.iter().cloned());
        state.trades.extend(cycle.trades.iter().cloned());
        if let Some(evaluation) = &cycle.evaluation {
            state.evaluations.push(evaluation.clone());
        }
        let session = &mut state.sessions[session_index].session;
        session.current_balance = cycle.balance;
        session.current_equity = cycle.equity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionRecord, TpTargetRecord};
    use chrono::{Duration, TimeZone};
    use momentum_core::{Side, StrategyParams};

    fn bar(i: i64, close: f64) -> Bar {
        Bar {
            open_time: Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap() + Duration::minutes(5 * i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    fn running(id: &str, symbol: &str) -> RunningSession {
        RunningSession {
            session: SessionRecord::new(id, symbol, 10, 1000.0),
            strategy: StrategyParams::default(),
            symbol_override: None,
            credentials: None,
        }
    }

    fn position(id: &str, session_id: &str) -> PositionRecord {
        PositionRecord {
            id: id.to_string(),
            session_id: session_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            qty: 1.0,
            original_qty: 1.0,
            entry_price: 100.0,
            sl: 95.0,
            tp: 110.0,
            leverage: 10.0,
            open_time: bar(0, 100.0).open_time,
            is_closed: false,
            trail_atr_mult: None,
            atr_value: None,
            r_multiple: None,
            trailing_active: false,
            trailing_offset: None,
            best_price: 100.0,
            entry_fee_total: 0.75,
            entry_fee_remaining: 0.75,
            realized_fees: 0.0,
            risk_amount: 50.0,
            risk_amount_remaining: 50.0,
            targets: vec![
                TpTargetRecord {
                    sort_order: 1,
                    price: 110.0,
                    ratio: 0.5,
                    target_qty: 0.5,
                    filled_qty: 0.0,
                    hit: false,
                    label: None,
                },
                TpTargetRecord {
                    sort_order: 0,
                    price: 105.0,
                    ratio: 0.5,
                    target_qty: 0.5,
                    filled_qty: 0.0,
                    hit: false,
                    label: Some("TP1".to_string()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_upsert_candle_keeps_id_and_refreshes_values() {
        let store = InMemoryStore::new();
        let first = store.upsert_candle("BTCUSDT", "5m", &bar(0, 100.0)).await.unwrap();
        let second = store.upsert_candle("BTCUSDT", "5m", &bar(0, 101.0)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.candle_count("BTCUSDT", "5m"), 1);

        let bars = store.recent_candles("BTCUSDT", "5m", 10).await.unwrap();
        assert_eq!(bars[0].close, 101.0);
    }

    #[tokio::test]
    async fn test_recent_candles_returns_latest_ascending() {
        let store = InMemoryStore::new();
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0 + i as f64)).collect();
        store.seed_candles("ETHUSDT", "5m", &bars);

        let recent = store.recent_candles("ETHUSDT", "5m", 3).await.unwrap();
        let closes: Vec<f64> = recent.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![107.0, 108.0, 109.0]);
        assert!(store.recent_candles("ETHUSDT", "1m", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_sessions_filters_symbol_and_status() {
        let store = InMemoryStore::new();
        store.insert_session(running("s1", "BTCUSDT"));
        store.insert_session(running("s2", "ETHUSDT"));
        let mut stopped = running("s3", "BTCUSDT");
        stopped.session.status = crate::models::SessionStatus::Stopped;
        store.insert_session(stopped);

        let sessions = store.running_sessions("BTCUSDT").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.id, "s1");
    }

    #[tokio::test]
    async fn test_commit_cycle_applies_all_changes() {
        let store = InMemoryStore::new();
        store.insert_session(running("s1", "BTCUSDT"));

        let mut cycle = SessionCycle::new("s1");
        cycle.opened.push(position("p1", "s1"));
        cycle.balance = 990.0;
        cycle.equity = 995.0;
        store.commit_cycle(&cycle).await.unwrap();

        let open = store.open_positions("s1").await.unwrap();
        assert_eq!(open.len(), 1);
        let orders: Vec<i32> = open[0].targets.iter().map(|t| t.sort_order).collect();
        assert_eq!(orders, vec![0, 1]);

        let mut closed = open[0].clone();
        closed.is_closed = true;
        closed.qty = 0.0;
        let mut next = SessionCycle::new("s1");
        next.updated.push(closed);
        next.balance = 1010.0;
        next.equity = 1010.0;
        store.commit_cycle(&next).await.unwrap();

        assert!(store.open_positions("s1").await.unwrap().is_empty());
        assert_eq!(store.positions("s1").len(), 1);
        let session = store.session("s1").unwrap().session;
        assert_eq!(session.current_balance, 1010.0);
        assert_eq!(session.current_equity, 1010.0);
    }

    #[tokio::test]
    async fn test_commit_cycle_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.insert_session(running("s1", "BTCUSDT"));

        let mut cycle = SessionCycle::new("s1");
        cycle.opened.push(position("p1", "s1"));
        cycle.updated.push(position("missing", "s1"));
        cycle.balance = 1.0;
        assert!(store.commit_cycle(&cycle).await.is_err());

        assert!(store.positions("s1").is_empty());
        assert_eq!(store.session("s1").unwrap().session.current_balance, 1000.0);
    }
}
