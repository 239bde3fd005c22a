//! Error taxonomy shared across the workspace.

use thiserror::Error;

/// Configuration could not be loaded or is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A session references a strategy that does not exist.
    #[error("strategy not found: {0}")]
    StrategyNotFound(String),
}

/// Failures talking to the exchange.
///
/// These abort only the live-dispatch step of a cycle; the simulated
/// position is kept.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("missing exchange API credentials")]
    MissingCredentials,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The exchange answered with a non-success business code.
    #[error("order rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("signing error: {0}")]
    Signing(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ExchangeError {
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
