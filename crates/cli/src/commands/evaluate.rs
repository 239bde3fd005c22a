//! One-off strategy evaluation with the full condition audit.

use anyhow::{bail, Context, Result};
use clap::Args;
use momentum_bitget::{BitgetClient, BitgetClientConfig};
use momentum_core::{AppConfig, Bar, ExchangeClient, SessionOverrides, StrategyParams, SymbolOverride};
use momentum_data::PgTradingStore;
use momentum_strategy::{evaluate, resolve_config, EvaluationOutput, EvaluationResult};

/// Arguments for the evaluate command.
#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Trading symbol (e.g., BTCUSDT)
    #[arg(long)]
    pub symbol: String,

    /// Strategy id (defaults to the seeded default strategy)
    #[arg(long)]
    pub strategy_id: Option<String>,

    /// Read candles from Bitget instead of the database, using the
    /// built-in strategy defaults
    #[arg(long)]
    pub from_exchange: bool,

    /// Print the evaluation as JSON
    #[arg(long)]
    pub json: bool,
}

/// Evaluates the latest bars of a symbol and prints the result.
///
/// # Errors
/// Returns an error if bars or strategy data cannot be loaded.
pub async fn run_evaluate(config: AppConfig, args: EvaluateArgs) -> Result<()> {
    let granularity = config.engine.granularity.clone();
    let limit = config.engine.bar_window;

    let (bars, strategy, symbol_override) = if args.from_exchange {
        let client = BitgetClient::new(BitgetClientConfig::from(&config.exchange))
            .context("Failed to build Bitget client")?;
        let bars = client.fetch_candles(&args.symbol, &granularity, limit).await?;
        let seed = SymbolOverride::seed_defaults()
            .into_iter()
            .find(|o| o.symbol == args.symbol);
        (bars, StrategyParams::default(), seed)
    } else {
        let store =
            PgTradingStore::connect(&config.database.url, config.database.max_connections).await?;
        let repos = store.repositories();
        let strategy_id = match &args.strategy_id {
            Some(id) => id.clone(),
            None => repos.strategies.ensure_default().await?,
        };
        let Some(params) = repos.strategies.params(&strategy_id).await? else {
            bail!("strategy not found: {strategy_id}");
        };
        let symbol_override = repos
            .strategies
            .symbol_override(&strategy_id, &args.symbol)
            .await?;
        let bars = repos.candles.recent(&args.symbol, &granularity, limit).await?;
        (bars, params, symbol_override)
    };

    let effective = resolve_config(
        &strategy,
        symbol_override.as_ref(),
        &SessionOverrides::default(),
    );
    let output = evaluate(&bars, &effective);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&args.symbol, &bars, &output);
    }
    Ok(())
}

fn print_report(symbol: &str, bars: &[Bar], output: &EvaluationOutput) {
    let result = EvaluationResult::from(output);
    let last = bars.last().map(|b| b.open_time.to_rfc3339()).unwrap_or_default();

    println!("{symbol}  bars={}  last={last}", bars.len());
    println!("result: {}", result.as_str());
    println!(
        "close={:.4} rsi={:.2} atr={:.4} ema_fast={:.4} ema_slow={:.4}",
        output.snapshot.close_price,
        output.snapshot.rsi_value,
        output.snapshot.atr_value,
        output.snapshot.ema_fast_value,
        output.snapshot.ema_slow_value,
    );

    if output.checks.is_empty() {
        println!("no conditions evaluated (insufficient history)");
    } else {
        println!();
        println!("{:<6} {:<24} {:<16} {:<16} {}", "SIDE", "CONDITION", "EXPECTED", "ACTUAL", "PASS");
        for check in &output.checks {
            println!(
                "{:<6} {:<24} {:<16} {:<16} {}",
                check.side.as_str(),
                check.condition_name,
                check.expected_value,
                check.actual_value,
                if check.passed { "yes" } else { "no" }
            );
        }
    }

    if let Some(signal) = &output.signal {
        println!();
        println!(
            "signal: {} entry={:.4} sl={:.4} tp={:.4} r={:.4}",
            signal.side, signal.entry_price, signal.sl, signal.tp, signal.r_multiple
        );
        for (i, level) in signal.tp_targets.iter().enumerate() {
            println!(
                "  {} price={:.4} ratio={:.2}",
                level.label.clone().unwrap_or_else(|| format!("TP{}", i + 1)),
                level.price,
                level.ratio
            );
        }
    }
}
