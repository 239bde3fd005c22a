//! CLI commands for the momentum trading engine.

pub mod backfill;
pub mod evaluate;
pub mod run;

pub use backfill::{run_backfill, BackfillArgs};
pub use evaluate::{run_evaluate, EvaluateArgs};
pub use run::{run_engine, RunArgs};
