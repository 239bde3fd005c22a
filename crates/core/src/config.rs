use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

/// How the feed decides that a candle is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseDetection {
    /// A row carrying a truthy confirm flag is final.
    #[default]
    ConfirmFlag,
    /// A row with a new open time finalizes the previous in-progress candle.
    Rollover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub ws_url: String,
    pub symbols: Vec<String>,
    pub granularity: String,
    pub inst_type: String,
    pub ping_interval_secs: u64,
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub channel_buffer_size: usize,
    pub close_detection: CloseDetection,
    /// Column of the confirm flag in a candle row.
    pub confirm_index: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.bitget.com/v2/ws/public".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            granularity: "5m".to_string(),
            inst_type: "USDT-FUTURES".to_string(),
            ping_interval_secs: 25,
            initial_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            channel_buffer_size: 1_000,
            close_detection: CloseDetection::ConfirmFlag,
            confirm_index: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub rest_url: String,
    pub product_type: String,
    pub margin_coin: String,
    pub margin_mode: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_url: "https://api.bitget.com".to_string(),
            product_type: "USDT-FUTURES".to_string(),
            margin_coin: "USDT".to_string(),
            margin_mode: "crossed".to_string(),
            timeout_secs: 10,
            requests_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/momentum".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of most recent bars loaded per session cycle.
    pub bar_window: usize,
    /// Sessions are skipped below this many stored bars.
    pub min_history: usize,
    pub granularity: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bar_window: 300,
            min_history: 50,
            granularity: "5m".to_string(),
        }
    }
}
