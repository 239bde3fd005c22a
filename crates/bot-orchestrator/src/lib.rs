//! Session orchestration driven by closed candles.
//!
//! The [`Orchestrator`] ties the feed, the store, the strategy engine, the
//! position simulator and the exchange client together. Different symbols
//! are processed concurrently; one symbol is never processed twice at the
//! same time.

pub mod convert;
pub mod guard;
pub mod orchestrator;
pub mod sizing;

pub use guard::{SymbolGuard, SymbolPermit};
pub use orchestrator::{CandleOutcome, Orchestrator, SessionOutcome, SessionReport};
pub use sizing::{estimated_profit, normalize_fee, size_entry, EntrySizing, SizingRejection};
