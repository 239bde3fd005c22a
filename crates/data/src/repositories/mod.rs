//! Postgres repositories.
//!
//! Reads go through the pool. Writes that belong to a session cycle take a
//! connection so the caller can group them in one transaction.

pub mod candle_repo;
pub mod evaluation_repo;
pub mod position_repo;
pub mod session_repo;
pub mod strategy_repo;
pub mod trade_repo;

pub use candle_repo::CandleRepository;
pub use evaluation_repo::EvaluationRepository;
pub use position_repo::PositionRepository;
pub use session_repo::SessionRepository;
pub use strategy_repo::StrategyRepository;
pub use trade_repo::TradeRepository;

use sqlx::PgPool;

/// All repositories over a single pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub candles: CandleRepository,
    pub sessions: SessionRepository,
    pub positions: PositionRepository,
    pub strategies: StrategyRepository,
}

impl Repositories {
    #[must_use]
    pub fn new(pool: &PgPool) -> Self {
        Self {
            candles: CandleRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            strategies: StrategyRepository::new(pool.clone()),
        }
    }
}
