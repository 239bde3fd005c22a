//! Persistence for the momentum trading engine.
//!
//! This crate provides:
//! - Storage records for candles, sessions, positions, trades and evaluations
//! - The [`TradingStore`] contract used by the orchestrator
//! - A Postgres implementation with migrations and typed repositories
//! - An in-memory implementation for tests and dry runs

pub mod database;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use database::PgTradingStore;
pub use memory::InMemoryStore;
pub use models::{
    CandleRecord, ConditionCheckRecord, EvaluationRecord, PositionRecord, RunningSession,
    SessionRecord, SessionStatus, TpTargetRecord, TradeRecord,
};
pub use repositories::{CandleRepository, Repositories, StrategyRepository};
pub use store::{SessionCycle, TradingStore};
