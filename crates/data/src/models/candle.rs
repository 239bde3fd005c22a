use chrono::{DateTime, Utc};
use momentum_core::Bar;
use serde::{Deserialize, Serialize};

/// A stored candle, unique per (symbol, granularity, open time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CandleRecord {
    pub id: String,
    pub symbol: String,
    pub granularity: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRecord {
    #[must_use]
    pub fn new(id: String, symbol: &str, granularity: &str, bar: &Bar) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            granularity: granularity.to_string(),
            open_time: bar.open_time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    #[must_use]
    pub const fn bar(&self) -> Bar {
        Bar {
            open_time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
