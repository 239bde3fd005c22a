//! Backfill command.
//!
//! Fetches Bitget history candles and upserts them into Postgres so that
//! sessions have enough history on their first closed candle.

use anyhow::{Context, Result};
use clap::Args;
use momentum_bitget::{BitgetClient, BitgetClientConfig};
use momentum_core::{AppConfig, ExchangeClient};
use momentum_data::PgTradingStore;
use tracing::info;

/// Arguments for the backfill command.
#[derive(Args, Debug, Clone)]
pub struct BackfillArgs {
    /// Trading symbol (e.g., BTCUSDT)
    #[arg(long)]
    pub symbol: String,

    /// Number of candles to fetch
    #[arg(long, default_value_t = 200)]
    pub limit: usize,

    /// Candle granularity (defaults to the engine granularity)
    #[arg(long)]
    pub granularity: Option<String>,

    /// Database connection URL (overrides the configured one)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,
}

/// Runs the backfill.
///
/// # Errors
/// Returns an error if fetching or storing fails.
pub async fn run_backfill(config: AppConfig, args: BackfillArgs) -> Result<()> {
    let granularity = args
        .granularity
        .clone()
        .unwrap_or_else(|| config.engine.granularity.clone());
    let db_url = args.db_url.as_deref().unwrap_or(&config.database.url);

    let client = BitgetClient::new(BitgetClientConfig::from(&config.exchange))
        .context("Failed to build Bitget client")?;
    let store = PgTradingStore::connect(db_url, config.database.max_connections).await?;

    info!(symbol = %args.symbol, granularity = %granularity, limit = args.limit, "fetching history");
    let bars = client
        .fetch_candles(&args.symbol, &granularity, args.limit)
        .await
        .with_context(|| format!("Failed to fetch candles for {}", args.symbol))?;

    let stored = store
        .repositories()
        .candles
        .upsert_batch(&args.symbol, &granularity, &bars)
        .await?;

    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => println!(
            "Backfilled {} {} candles for {} ({} .. {})",
            stored, granularity, args.symbol, first.open_time, last.open_time
        ),
        _ => println!("No candles returned for {}", args.symbol),
    }
    Ok(())
}
