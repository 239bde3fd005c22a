use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position or signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    #[must_use]
    pub const fn direction(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// One OHLCV candle. Sequences are ordered ascending by `open_time`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One take-profit level of a ladder. `ratio` is the fraction of the
/// original position quantity closed at `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpLevel {
    pub price: f64,
    pub ratio: f64,
    pub label: Option<String>,
}

/// Candle events published by the market data feed.
///
/// `Update` keeps storage current; only `Closed` drives strategy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CandleEvent {
    Update {
        symbol: String,
        granularity: String,
        bar: Bar,
    },
    Closed {
        symbol: String,
        granularity: String,
        bar: Bar,
    },
}

impl CandleEvent {
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Update { symbol, .. } | Self::Closed { symbol, .. } => symbol,
        }
    }

    #[must_use]
    pub const fn bar(&self) -> &Bar {
        match self {
            Self::Update { bar, .. } | Self::Closed { bar, .. } => bar,
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_direction_and_parse() {
        assert_eq!(Side::Long.direction(), 1.0);
        assert_eq!(Side::Short.direction(), -1.0);
        assert_eq!("LONG".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
    }

    #[test]
    fn test_side_serializes_lowercase() {
        let json = serde_json::to_string(&Side::Short).unwrap();
        assert_eq!(json, "\"short\"");
    }

    #[test]
    fn test_candle_event_accessors() {
        let bar = Bar {
            open_time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        };
        let event = CandleEvent::Closed {
            symbol: "BTCUSDT".to_string(),
            granularity: "5m".to_string(),
            bar,
        };
        assert!(event.is_closed());
        assert_eq!(event.symbol(), "BTCUSDT");
        assert_eq!(event.bar().close, 1.5);
    }
}
