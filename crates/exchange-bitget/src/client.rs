//! Bitget v2 mix REST client with rate limiting.
//!
//! Public history candles for backfill and signed market orders with
//! separate TP/SL plan orders for live dispatch.
//!
//! # Example
//!
//! ```ignore
//! use momentum_bitget::{BitgetClient, BitgetClientConfig};
//! use momentum_core::ExchangeClient;
//!
//! let client = BitgetClient::new(BitgetClientConfig::default())?;
//! let bars = client.fetch_candles("BTCUSDT", "5m", 200).await?;
//! println!("latest close {}", bars.last().map_or(0.0, |b| b.close));
//! ```

use crate::aggregator::CandleRow;
use crate::signing::BitgetSigner;
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use momentum_core::{
    Bar, ExchangeClient, ExchangeCredentials, ExchangeError, ExchangeSettings, OrderRequest,
    OrderResult, Side,
};
use nonzero_ext::nonzero;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Constants
// =============================================================================

pub const BITGET_REST_URL: &str = "https://api.bitget.com";

const SUCCESS_CODE: &str = "00000";
const HISTORY_CANDLES_PATH: &str = "/api/v2/mix/market/history-candles";
const SET_LEVERAGE_PATH: &str = "/api/v2/mix/account/set-leverage";
const PLACE_ORDER_PATH: &str = "/api/v2/mix/order/place-order";
const PLACE_TPSL_PATH: &str = "/api/v2/mix/order/place-tpsl-order";

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct BitgetClientConfig {
    pub base_url: String,
    pub product_type: String,
    pub margin_coin: String,
    pub margin_mode: String,
    pub requests_per_second: NonZeroU32,
    pub timeout_secs: u64,
}

impl Default for BitgetClientConfig {
    fn default() -> Self {
        Self::from(&ExchangeSettings::default())
    }
}

impl From<&ExchangeSettings> for BitgetClientConfig {
    fn from(s: &ExchangeSettings) -> Self {
        Self {
            base_url: s.rest_url.trim_end_matches('/').to_string(),
            product_type: s.product_type.clone(),
            margin_coin: s.margin_coin.clone(),
            margin_mode: s.margin_mode.clone(),
            requests_per_second: NonZeroU32::new(s.requests_per_second)
                .unwrap_or(nonzero!(10u32)),
            timeout_secs: s.timeout_secs,
        }
    }
}

impl BitgetClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    #[serde(default)]
    order_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetLeverageBody<'a> {
    symbol: &'a str,
    product_type: &'a str,
    margin_coin: &'a str,
    leverage: String,
    hold_side: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderBody<'a> {
    symbol: &'a str,
    product_type: &'a str,
    margin_mode: &'a str,
    margin_coin: &'a str,
    size: String,
    side: &'static str,
    order_type: &'static str,
    client_oid: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceTpslBody<'a> {
    symbol: &'a str,
    product_type: &'a str,
    margin_coin: &'a str,
    plan_type: &'static str,
    trigger_price: String,
    trigger_type: &'static str,
    hold_side: &'static str,
    size: String,
}

const fn hold_side(side: Side) -> &'static str {
    match side {
        Side::Long => "long",
        Side::Short => "short",
    }
}

const fn order_side(side: Side) -> &'static str {
    match side {
        Side::Long => "buy",
        Side::Short => "sell",
    }
}

/// Formats a float as the plain decimal string Bitget expects.
fn decimal_string(value: f64) -> Result<String, ExchangeError> {
    Decimal::try_from(value)
        .map(|d| d.round_dp(8).normalize().to_string())
        .map_err(|e| ExchangeError::Parse(format!("cannot format {value}: {e}")))
}

fn map_transport(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout(err.to_string())
    } else {
        ExchangeError::Http(err.to_string())
    }
}

// =============================================================================
// Client
// =============================================================================

pub struct BitgetClient {
    config: BitgetClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitgetClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BitgetClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BitgetClientConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Http(e.to_string()))?;

        let quota = Quota::per_second(config.requests_per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BitgetClientConfig {
        &self.config
    }

    // =========================================================================
    // Request Plumbing
    // =========================================================================

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{path}?{query}", self.config.base_url);
        let response = self.http.get(&url).send().await.map_err(map_transport)?;
        self.handle_response(response).await
    }

    async fn post_signed<B: Serialize, T: DeserializeOwned>(
        &self,
        signer: &BitgetSigner,
        path: &str,
        body: &B,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let body_json = serde_json::to_string(body)?;
        let headers = signer.headers(Method::POST.as_str(), path, None, &body_json)?;

        let url = format!("{}{path}", self.config.base_url);
        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("locale", "en-US");
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        let response = request
            .body(body_json)
            .send()
            .await
            .map_err(map_transport)?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ExchangeError::api(429, "rate limited"));
        }

        let text = response.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(ExchangeError::api(status.as_u16(), text));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
        if envelope.code != SUCCESS_CODE {
            return Err(ExchangeError::Rejected {
                code: envelope.code,
                message: envelope.msg.unwrap_or_default(),
            });
        }
        envelope
            .data
            .ok_or_else(|| ExchangeError::Parse("response has no data".to_string()))
    }

    // =========================================================================
    // Market Data
    // =========================================================================

    /// Fetches history candles, ascending by open time. Rows whose prices
    /// do not parse are dropped.
    ///
    /// # Errors
    /// Returns an error if the request fails or the envelope is not a success.
    pub async fn history_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("symbol", symbol)
            .append_pair("productType", &self.config.product_type)
            .append_pair("granularity", granularity)
            .append_pair("limit", &limit.to_string())
            .finish();

        let rows: Vec<Vec<Value>> = self.get_public(HISTORY_CANDLES_PATH, &query).await?;
        let total = rows.len();

        let mut bars: Vec<Bar> = rows
            .iter()
            .filter_map(|row| match CandleRow::parse(row, usize::MAX) {
                Ok(parsed) => Some(parsed.bar),
                Err(e) => {
                    debug!(symbol, error = %e, "dropping history row");
                    None
                }
            })
            .collect();
        bars.sort_by_key(|b| b.open_time);

        debug!(symbol, granularity, total, kept = bars.len(), "fetched history candles");
        Ok(bars)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Sets leverage for one hold side.
    ///
    /// # Errors
    /// Returns an error if the exchange rejects the change.
    pub async fn set_leverage(
        &self,
        signer: &BitgetSigner,
        symbol: &str,
        leverage: u32,
        side: Side,
    ) -> Result<(), ExchangeError> {
        let body = SetLeverageBody {
            symbol,
            product_type: &self.config.product_type,
            margin_coin: &self.config.margin_coin,
            leverage: leverage.to_string(),
            hold_side: hold_side(side),
        };
        let _: Value = self.post_signed(signer, SET_LEVERAGE_PATH, &body).await?;
        Ok(())
    }

    /// Places a one-way market order.
    ///
    /// # Errors
    /// Returns an error if the order is not accepted.
    pub async fn market_order(
        &self,
        signer: &BitgetSigner,
        symbol: &str,
        side: Side,
        qty: f64,
        client_oid: &str,
    ) -> Result<Option<String>, ExchangeError> {
        let body = PlaceOrderBody {
            symbol,
            product_type: &self.config.product_type,
            margin_mode: &self.config.margin_mode,
            margin_coin: &self.config.margin_coin,
            size: decimal_string(qty)?,
            side: order_side(side),
            order_type: "market",
            client_oid,
        };
        let placed: PlacedOrder = self.post_signed(signer, PLACE_ORDER_PATH, &body).await?;
        Ok(placed.order_id)
    }

    /// Places a mark-price triggered TP (`profit_plan`) or SL (`loss_plan`).
    ///
    /// # Errors
    /// Returns an error if the plan order is not accepted.
    pub async fn plan_order(
        &self,
        signer: &BitgetSigner,
        symbol: &str,
        side: Side,
        qty: f64,
        plan_type: &'static str,
        trigger_price: f64,
    ) -> Result<(), ExchangeError> {
        let body = PlaceTpslBody {
            symbol,
            product_type: &self.config.product_type,
            margin_coin: &self.config.margin_coin,
            plan_type,
            trigger_price: decimal_string(trigger_price)?,
            trigger_type: "mark_price",
            hold_side: hold_side(side),
            size: decimal_string(qty)?,
        };
        let _: Value = self.post_signed(signer, PLACE_TPSL_PATH, &body).await?;
        Ok(())
    }

    async fn best_effort_plan(
        &self,
        signer: &BitgetSigner,
        order: &OrderRequest,
        plan_type: &'static str,
        trigger_price: Option<f64>,
    ) -> bool {
        let Some(price) = trigger_price.filter(|p| *p > 0.0) else {
            return false;
        };
        let label = if plan_type == "profit_plan" { "TP" } else { "SL" };
        match self
            .plan_order(signer, &order.symbol, order.side, order.qty, plan_type, price)
            .await
        {
            Ok(()) => {
                info!(symbol = %order.symbol, side = %order.side, price, "{label} placed");
                true
            }
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "{label} failed");
                false
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        self.history_candles(symbol, granularity, limit).await
    }

    async fn place_order(
        &self,
        credentials: &ExchangeCredentials,
        order: &OrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        let signer = BitgetSigner::new(credentials)?;

        let leverage_set = match self
            .set_leverage(&signer, &order.symbol, order.leverage, order.side)
            .await
        {
            Ok(()) => {
                info!(symbol = %order.symbol, leverage = order.leverage, "leverage set");
                true
            }
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "leverage set warning");
                false
            }
        };

        let client_oid = format!("bot#{}", Utc::now().timestamp_millis());
        info!(symbol = %order.symbol, side = %order.side, qty = order.qty, "placing order");
        let order_id = self
            .market_order(&signer, &order.symbol, order.side, order.qty, &client_oid)
            .await?;
        info!(symbol = %order.symbol, order_id = ?order_id, "order placed");

        let tp_placed = self.best_effort_plan(&signer, order, "profit_plan", order.tp).await;
        let sl_placed = self.best_effort_plan(&signer, order, "loss_plan", order.sl).await;

        Ok(OrderResult {
            order_id,
            client_oid,
            leverage_set,
            tp_placed,
            sl_placed,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BitgetClient {
        BitgetClient::new(BitgetClientConfig::default().with_base_url(server.uri())).unwrap()
    }

    fn creds() -> ExchangeCredentials {
        ExchangeCredentials::new("key", "secret", "pass")
    }

    fn order(tp: Option<f64>, sl: Option<f64>) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            qty: 0.0125,
            leverage: 5,
            sl,
            tp,
        }
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "00000",
            "msg": "success",
            "requestTime": 1_700_000_000_000_i64,
            "data": data
        }))
    }

    async fn mount_ok(server: &MockServer, endpoint: &str, data: Value) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ok(data))
            .mount(server)
            .await;
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_client_config_default() {
        let config = BitgetClientConfig::default();
        assert_eq!(config.base_url, BITGET_REST_URL);
        assert_eq!(config.product_type, "USDT-FUTURES");
        assert_eq!(config.margin_mode, "crossed");
        assert_eq!(config.requests_per_second.get(), 10);
    }

    #[test]
    fn test_client_config_builder() {
        let config = BitgetClientConfig::default()
            .with_base_url("http://localhost:1")
            .with_rate_limit(nonzero!(2u32))
            .with_timeout_secs(3);
        assert_eq!(config.base_url, "http://localhost:1");
        assert_eq!(config.requests_per_second.get(), 2);
        assert_eq!(config.timeout_secs, 3);
    }

    #[test]
    fn test_decimal_string() {
        assert_eq!(decimal_string(0.0125).unwrap(), "0.0125");
        assert_eq!(decimal_string(100.0).unwrap(), "100");
        assert_eq!(decimal_string(0.123_456_789_123).unwrap(), "0.12345679");
        assert!(decimal_string(f64::NAN).is_err());
        assert_eq!(
            Decimal::try_from(95.5).unwrap().round_dp(8).normalize(),
            dec!(95.5)
        );
    }

    // ==================== Candle Tests ====================

    #[tokio::test]
    async fn test_fetch_candles_sorted_and_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HISTORY_CANDLES_PATH))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("productType", "USDT-FUTURES"))
            .and(query_param("granularity", "5m"))
            .and(query_param("limit", "3"))
            .respond_with(ok(serde_json::json!([
                ["1700000600000", "102", "103", "101", "102.5", "10", "1000"],
                ["1700000000000", "100", "101", "99", "100.5", "12", "1200"],
                ["1700000300000", "101", "102", "100", "NaN?", "11", "1100"]
            ])))
            .mount(&server)
            .await;

        let bars = client_for(&server).fetch_candles("BTCUSDT", "5m", 3).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].open_time < bars[1].open_time);
        assert!((bars[0].close - 100.5).abs() < 1e-9);
        assert!((bars[1].volume - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fetch_candles_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HISTORY_CANDLES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "40034", "msg": "Parameter does not exist", "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_candles("NOPE", "5m", 10).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected { ref code, .. } if code == "40034"));
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HISTORY_CANDLES_PATH))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_candles("BTCUSDT", "5m", 10).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status: 429, .. }));
    }

    // ==================== Order Tests ====================

    #[tokio::test]
    async fn test_place_order_full_flow() {
        let server = MockServer::start().await;
        mount_ok(&server, SET_LEVERAGE_PATH, serde_json::json!({"symbol": "BTCUSDT"})).await;
        Mock::given(method("POST"))
            .and(path(PLACE_ORDER_PATH))
            .and(header_exists("ACCESS-SIGN"))
            .and(header_exists("ACCESS-TIMESTAMP"))
            .and(body_partial_json(serde_json::json!({
                "symbol": "BTCUSDT",
                "side": "buy",
                "orderType": "market",
                "marginMode": "crossed",
                "size": "0.0125"
            })))
            .respond_with(ok(serde_json::json!({"orderId": "123", "clientOid": "bot#1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PLACE_TPSL_PATH))
            .and(body_partial_json(serde_json::json!({
                "planType": "profit_plan", "triggerPrice": "110", "holdSide": "long"
            })))
            .respond_with(ok(serde_json::json!({"orderId": "tp"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PLACE_TPSL_PATH))
            .and(body_partial_json(serde_json::json!({
                "planType": "loss_plan", "triggerPrice": "95.5", "triggerType": "mark_price"
            })))
            .respond_with(ok(serde_json::json!({"orderId": "sl"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .place_order(&creds(), &order(Some(110.0), Some(95.5)))
            .await
            .unwrap();

        assert_eq!(result.order_id.as_deref(), Some("123"));
        assert!(result.client_oid.starts_with("bot#"));
        assert!(result.leverage_set);
        assert!(result.tp_placed);
        assert!(result.sl_placed);
    }

    #[tokio::test]
    async fn test_leverage_and_plan_failures_are_best_effort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SET_LEVERAGE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad leverage"))
            .mount(&server)
            .await;
        mount_ok(&server, PLACE_ORDER_PATH, serde_json::json!({"orderId": "9"})).await;
        Mock::given(method("POST"))
            .and(path(PLACE_TPSL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "43011", "msg": "trigger price invalid", "data": null
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .place_order(&creds(), &order(Some(110.0), Some(95.0)))
            .await
            .unwrap();

        assert!(!result.leverage_set);
        assert_eq!(result.order_id.as_deref(), Some("9"));
        assert!(!result.tp_placed);
        assert!(!result.sl_placed);
    }

    #[tokio::test]
    async fn test_rejected_market_order_fails_and_skips_plans() {
        let server = MockServer::start().await;
        mount_ok(&server, SET_LEVERAGE_PATH, serde_json::json!({})).await;
        Mock::given(method("POST"))
            .and(path(PLACE_ORDER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "40762", "msg": "The order amount exceeds the balance", "data": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PLACE_TPSL_PATH))
            .respond_with(ok(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .place_order(&creds(), &order(Some(110.0), Some(95.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected { ref code, .. } if code == "40762"));
    }

    #[tokio::test]
    async fn test_missing_plan_prices_skip_plan_orders() {
        let server = MockServer::start().await;
        mount_ok(&server, SET_LEVERAGE_PATH, serde_json::json!({})).await;
        mount_ok(&server, PLACE_ORDER_PATH, serde_json::json!({"orderId": "1"})).await;
        Mock::given(method("POST"))
            .and(path(PLACE_TPSL_PATH))
            .respond_with(ok(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .place_order(&creds(), &order(None, None))
            .await
            .unwrap();
        assert!(!result.tp_placed);
        assert!(!result.sl_placed);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .place_order(&ExchangeCredentials::new("", "s", "p"), &order(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials));
    }
}
