pub mod engine;
pub mod indicators;
pub mod resolver;

pub use engine::{
    evaluate, ConditionCheck, EvaluationOutput, EvaluationResult, Snapshot, StrategyEngine,
    StrategySignal,
};
pub use resolver::{resolve_config, EffectiveConfig};
