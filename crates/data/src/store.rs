//! Persistence contract used by the orchestrator.

use crate::models::{EvaluationRecord, PositionRecord, RunningSession, TradeRecord};
use anyhow::Result;
use async_trait::async_trait;
use momentum_core::Bar;

/// Everything one session cycle writes.
///
/// Stores apply a cycle atomically: either all of it is visible or none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionCycle {
    pub session_id: String,
    pub trades: Vec<TradeRecord>,
    pub evaluation: Option<EvaluationRecord>,
    /// Positions opened this cycle, with their ladders.
    pub opened: Vec<PositionRecord>,
    /// Post-candle state of positions that existed before the cycle.
    /// Closed positions carry `is_closed` and zero quantity.
    pub updated: Vec<PositionRecord>,
    pub balance: f64,
    pub equity: f64,
}

impl SessionCycle {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait TradingStore: Send + Sync {
    /// Inserts or refreshes the candle keyed by (symbol, granularity,
    /// open time) and returns its id.
    async fn upsert_candle(&self, symbol: &str, granularity: &str, bar: &Bar) -> Result<String>;

    /// The most recent `limit` candles, ascending by open time.
    async fn recent_candles(&self, symbol: &str, granularity: &str, limit: usize)
        -> Result<Vec<Bar>>;

    /// Running sessions on `symbol` with strategy, override and credentials.
    async fn running_sessions(&self, symbol: &str) -> Result<Vec<RunningSession>>;

    /// Open positions of a session with targets ordered by sort order.
    async fn open_positions(&self, session_id: &str) -> Result<Vec<PositionRecord>>;

    async fn commit_cycle(&self, cycle: &SessionCycle) -> Result<()>;
}
