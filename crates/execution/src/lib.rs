//! Simulated position management.
//!
//! [`PositionSimulator`] owns one session's balance, open positions and
//! trade log. The orchestrator rebuilds it from storage every cycle.

pub mod position;
pub mod simulator;

pub use position::{CloseReason, OpenPositionSpec, SimPosition, SimTpTarget, SimTrade};
pub use simulator::{FeeConfig, PositionSimulator};
