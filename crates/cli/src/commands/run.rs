//! Live engine: candle feed plus orchestrator until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;
use momentum_bitget::{BitgetClient, BitgetClientConfig, FeedConfig, MarketDataFeed};
use momentum_bot_orchestrator::Orchestrator;
use momentum_core::{AppConfig, ExchangeClient, StrategyParams, SymbolOverride};
use momentum_data::{InMemoryStore, PgTradingStore, RunningSession, SessionRecord, TradingStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Keep everything in memory with one simulation session per tracked
    /// symbol instead of using Postgres
    #[arg(long)]
    pub dry_run: bool,

    /// Starting balance of dry-run sessions (USDT)
    #[arg(long, default_value_t = 1000.0)]
    pub balance: f64,

    /// Leverage of dry-run sessions
    #[arg(long, default_value_t = 5)]
    pub leverage: u32,
}

/// Runs the engine until Ctrl-C.
///
/// # Errors
/// Returns an error if the store or the exchange client cannot be set up.
pub async fn run_engine(config: AppConfig, args: RunArgs) -> Result<()> {
    let exchange = Arc::new(
        BitgetClient::new(BitgetClientConfig::from(&config.exchange))
            .context("Failed to build Bitget client")?,
    );

    if args.dry_run {
        info!(symbols = ?config.feed.symbols, "starting dry run with in-memory store");
        let store = Arc::new(dry_run_store(&config, &args, exchange.as_ref()).await);
        drive(store, exchange, &config).await
    } else {
        let store = PgTradingStore::connect(&config.database.url, config.database.max_connections)
            .await?;
        let strategy_id = store.repositories().strategies.ensure_default().await?;
        info!(strategy_id = %strategy_id, "default strategy ready");
        drive(Arc::new(store), exchange, &config).await
    }
}

/// One simulation session per symbol, warmed up with exchange history.
async fn dry_run_store(
    config: &AppConfig,
    args: &RunArgs,
    exchange: &BitgetClient,
) -> InMemoryStore {
    let store = InMemoryStore::new();
    let overrides = SymbolOverride::seed_defaults();
    let granularity = &config.feed.granularity;

    for symbol in &config.feed.symbols {
        match exchange
            .fetch_candles(symbol, granularity, config.engine.bar_window)
            .await
        {
            Ok(bars) => {
                info!(symbol = %symbol, bars = bars.len(), "warmed up history");
                store.seed_candles(symbol, granularity, &bars);
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "history warm-up failed"),
        }

        store.insert_session(RunningSession {
            session: SessionRecord::new(
                Uuid::new_v4().to_string(),
                symbol.clone(),
                args.leverage,
                args.balance,
            ),
            strategy: StrategyParams::default(),
            symbol_override: overrides.iter().find(|o| &o.symbol == symbol).cloned(),
            credentials: None,
        });
    }
    store
}

async fn drive<S: TradingStore + 'static>(
    store: Arc<S>,
    exchange: Arc<BitgetClient>,
    config: &AppConfig,
) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(store, exchange, config.engine.clone()));
    let (feed, events) = MarketDataFeed::new(FeedConfig::from(&config.feed)).start();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(orchestrator.run(events, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down");

    feed.stop();
    let _ = shutdown_tx.send(true);
    feed.join().await;
    runner.await.context("Orchestrator task failed")?;

    info!("engine stopped");
    Ok(())
}
