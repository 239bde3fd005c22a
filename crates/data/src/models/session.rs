//! Trading sessions and the relations loaded with them.

use momentum_core::{ExchangeCredentials, SessionOverrides, StrategyParams, SymbolOverride};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// One account trading one symbol with one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub leverage: u32,
    pub status: SessionStatus,
    /// When set, signals are never forwarded to the exchange.
    pub simulation: bool,
    pub starting_balance: f64,
    pub current_balance: f64,
    pub current_equity: f64,
    pub overrides: SessionOverrides,
}

impl SessionRecord {
    /// A running session with a fresh balance.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        leverage: u32,
        starting_balance: f64,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            strategy_id: String::new(),
            symbol: symbol.into(),
            leverage,
            status: SessionStatus::Running,
            simulation: true,
            starting_balance,
            current_balance: starting_balance,
            current_equity: starting_balance,
            overrides: SessionOverrides::default(),
        }
    }
}

/// A running session with everything needed for one processing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningSession {
    pub session: SessionRecord,
    pub strategy: StrategyParams,
    pub symbol_override: Option<SymbolOverride>,
    /// Present only when the owning account stored a complete key set.
    pub credentials: Option<ExchangeCredentials>,
}
