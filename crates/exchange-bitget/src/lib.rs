//! Bitget USDT-futures integration.
//!
//! - [`MarketDataFeed`]: public candle websocket with reconnect backoff,
//!   keep-alive pings and close detection
//! - [`BitgetClient`]: REST client implementing
//!   [`momentum_core::ExchangeClient`] for history backfill and live orders

pub mod aggregator;
pub mod client;
pub mod error;
pub mod feed;
pub mod signing;

pub use aggregator::{CandleAggregator, CandleRow};
pub use client::{BitgetClient, BitgetClientConfig, BITGET_REST_URL};
pub use error::FeedError;
pub use feed::{Backoff, ConnectionState, FeedConfig, FeedHandle, MarketDataFeed};
pub use signing::BitgetSigner;
