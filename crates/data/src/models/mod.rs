//! Storage records for the momentum trading engine.
//!
//! Records are plain data. The orchestrator converts simulator and engine
//! types into them; the stores persist them as-is.

pub mod candle;
pub mod evaluation;
pub mod position;
pub mod session;
pub mod trade;

pub use candle::CandleRecord;
pub use evaluation::{ConditionCheckRecord, EvaluationRecord};
pub use position::{PositionRecord, TpTargetRecord};
pub use session::{RunningSession, SessionRecord, SessionStatus};
pub use trade::TradeRecord;
