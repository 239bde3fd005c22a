use crate::error::ExchangeError;
use crate::events::{Bar, Side};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API credentials of the account that owns a live session.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ExchangeCredentials {
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
        }
    }

    /// All three parts are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.passphrase.is_empty()
    }
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// A market entry with optional protective plan orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub leverage: u32,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: Option<String>,
    pub client_oid: String,
    pub leverage_set: bool,
    pub tp_placed: bool,
    pub sl_placed: bool,
}

/// Exchange collaborator used for history backfill and live dispatch.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetches recent candles, ascending by open time.
    async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError>;

    /// Places a market order. Leverage and TP/SL plan orders are best-effort;
    /// only the market order itself fails the call.
    async fn place_order(
        &self,
        credentials: &ExchangeCredentials,
        order: &OrderRequest,
    ) -> Result<OrderResult, ExchangeError>;
}
