//! Public candle websocket.
//!
//! One spawned task owns the connection. It subscribes every tracked
//! symbol, pings on a fixed interval while connected and reconnects with
//! capped exponential backoff until the feed is stopped.
//!
//! # Example
//!
//! ```ignore
//! use momentum_bitget::{FeedConfig, MarketDataFeed};
//!
//! let (handle, mut events) = MarketDataFeed::new(FeedConfig::default()).start();
//! while let Some(event) = events.recv().await {
//!     println!("{} closed={}", event.symbol(), event.is_closed());
//! }
//! handle.stop();
//! ```

use crate::aggregator::CandleAggregator;
use crate::error::FeedError;
use futures_util::{SinkExt, StreamExt};
use momentum_core::{CandleEvent, CloseDetection, FeedSettings};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Runtime settings of a [`MarketDataFeed`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub symbols: Vec<String>,
    pub granularity: String,
    pub inst_type: String,
    pub ping_interval: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub channel_buffer_size: usize,
    pub close_detection: CloseDetection,
    pub confirm_index: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from(&FeedSettings::default())
    }
}

impl From<&FeedSettings> for FeedConfig {
    fn from(s: &FeedSettings) -> Self {
        Self {
            url: s.ws_url.clone(),
            symbols: s.symbols.clone(),
            granularity: s.granularity.clone(),
            inst_type: s.inst_type.clone(),
            ping_interval: Duration::from_secs(s.ping_interval_secs.max(1)),
            initial_reconnect_delay: Duration::from_millis(s.initial_reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(s.max_reconnect_delay_ms),
            channel_buffer_size: s.channel_buffer_size.max(1),
            close_detection: s.close_detection,
            confirm_index: s.confirm_index,
        }
    }
}

impl FeedConfig {
    /// Websocket channel name, e.g. `candle5m`.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("candle{}", self.granularity)
    }

    fn subscription(&self) -> SubscribeRequest<'_> {
        SubscribeRequest {
            op: "subscribe",
            args: self
                .symbols
                .iter()
                .map(|symbol| SubscribeArg {
                    inst_type: &self.inst_type,
                    channel: self.channel(),
                    inst_id: symbol,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    op: &'static str,
    args: Vec<SubscribeArg<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeArg<'a> {
    inst_type: &'a str,
    channel: String,
    inst_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Capped exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct MarketDataFeed {
    config: FeedConfig,
}

impl MarketDataFeed {
    #[must_use]
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Spawns the connection task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(self) -> (FeedHandle, mpsc::Receiver<CandleEvent>) {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stopped = Arc::new(AtomicBool::new(false));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        info!(
            url = %self.config.url,
            symbols = ?self.config.symbols,
            channel = %self.config.channel(),
            "starting market data feed"
        );

        let task = tokio::spawn(run_connection_loop(
            self.config,
            event_tx,
            Arc::clone(&stopped),
            Arc::clone(&state),
            shutdown_rx,
        ));

        (
            FeedHandle {
                stopped,
                state,
                shutdown_tx,
                task,
            },
            event_rx,
        )
    }
}

/// Control side of a running feed.
pub struct FeedHandle {
    stopped: Arc<AtomicBool>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stops the feed permanently. No reconnect is attempted afterwards.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for the connection task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "market data feed task failed");
        }
    }
}

async fn run_connection_loop(
    config: FeedConfig,
    event_tx: mpsc::Sender<CandleEvent>,
    stopped: Arc<AtomicBool>,
    state: Arc<RwLock<ConnectionState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut aggregator =
        CandleAggregator::new(&config.granularity, config.close_detection, config.confirm_index);
    let mut backoff = Backoff::new(config.initial_reconnect_delay, config.max_reconnect_delay);

    while !stopped.load(Ordering::SeqCst) {
        *state.write() = ConnectionState::Connecting;

        let result = connect_and_run(
            &config,
            &mut aggregator,
            &event_tx,
            &state,
            &mut backoff,
            &mut shutdown_rx,
        )
        .await;
        *state.write() = ConnectionState::Disconnected;

        match result {
            Ok(()) => break,
            Err(FeedError::Stopped) => {
                stopped.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => warn!(error = %e, "market data feed disconnected"),
        }

        if stopped.load(Ordering::SeqCst) {
            break;
        }
        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting market data feed");
        tokio::select! {
            () = sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    *state.write() = ConnectionState::Disconnected;
    info!("market data feed stopped");
}

/// Runs one connection until it fails or the feed shuts down.
async fn connect_and_run(
    config: &FeedConfig,
    aggregator: &mut CandleAggregator,
    event_tx: &mpsc::Sender<CandleEvent>,
    state: &RwLock<ConnectionState>,
    backoff: &mut Backoff,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), FeedError> {
    let (ws_stream, _response) = connect_async(&config.url)
        .await
        .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

    *state.write() = ConnectionState::Connected;
    backoff.reset();
    info!(url = %config.url, "market data feed connected");

    let (mut write, mut read) = ws_stream.split();

    let sub_json = serde_json::to_string(&config.subscription())?;
    debug!(message = %sub_json, "sending subscription");
    write.send(Message::Text(sub_json)).await?;

    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("shutdown requested, closing market data feed");
                let _ = write.close().await;
                return Ok(());
            }

            _ = ping.tick() => {
                debug!("sending ping");
                write.send(Message::Text("ping".to_string())).await?;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text == "pong" {
                            continue;
                        }
                        forward(aggregator, &text, event_tx).await?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = String::from_utf8(data) {
                            forward(aggregator, &text, event_tx).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        return Err(FeedError::ConnectionFailed(
                            frame.map_or_else(|| "connection closed".to_string(), |f| f.reason.to_string()),
                        ));
                    }
                    Some(Err(e)) => return Err(FeedError::WebSocket(e)),
                    None => return Err(FeedError::ConnectionFailed("stream ended".to_string())),
                }
            }
        }
    }
}

/// Parses one frame and publishes its events. Parse failures are logged
/// and swallowed; only a dropped receiver is an error.
async fn forward(
    aggregator: &mut CandleAggregator,
    text: &str,
    event_tx: &mpsc::Sender<CandleEvent>,
) -> Result<(), FeedError> {
    let events = match aggregator.handle_text(text) {
        Ok(events) => events,
        Err(FeedError::Subscribe(msg)) => {
            error!(error = %msg, "feed subscription rejected");
            return Ok(());
        }
        Err(e) => {
            debug!(error = %e, "ignoring feed message");
            return Ok(());
        }
    };
    for event in events {
        event_tx.send(event).await.map_err(|_| FeedError::Stopped)?;
    }
    Ok(())
}
