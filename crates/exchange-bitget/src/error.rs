//! Error types for the market data feed.

use thiserror::Error;

/// Feed failures. Transport errors end the current connection and trigger
/// a reconnect; parse errors only skip the offending message.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid candle row: {0}")]
    InvalidRow(String),

    #[error("subscription rejected: {0}")]
    Subscribe(String),

    /// The event receiver was dropped or the feed was stopped.
    #[error("feed stopped")]
    Stopped,
}

impl FeedError {
    /// Whether the connection should be torn down and re-established.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::WebSocket(_))
    }
}
