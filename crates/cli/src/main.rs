use clap::{Parser, Subcommand};

mod commands;

use commands::{BackfillArgs, EvaluateArgs, RunArgs};

#[derive(Parser)]
#[command(name = "momentum")]
#[command(about = "Bitget USDT-futures momentum trading engine", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream candles and run all sessions until Ctrl-C
    Run(RunArgs),
    /// Fetch history candles from Bitget into the candle store
    Backfill(BackfillArgs),
    /// Evaluate the strategy on the latest stored candles of a symbol
    Evaluate(EvaluateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = momentum_core::ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Run(args) => commands::run_engine(config, args).await?,
        Commands::Backfill(args) => commands::run_backfill(config, args).await?,
        Commands::Evaluate(args) => commands::run_evaluate(config, args).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backfill() {
        let cli = Cli::try_parse_from(["momentum", "backfill", "--symbol", "BTCUSDT", "--limit", "500"])
            .unwrap();
        assert_eq!(cli.config, "config/Config.toml");
        let Commands::Backfill(args) = cli.command else {
            panic!("expected backfill");
        };
        assert_eq!(args.symbol, "BTCUSDT");
        assert_eq!(args.limit, 500);
        assert!(args.granularity.is_none());
    }

    #[test]
    fn test_parse_run_dry_run_with_config() {
        let cli = Cli::try_parse_from(["momentum", "run", "--dry-run", "-c", "alt.toml"]).unwrap();
        assert_eq!(cli.config, "alt.toml");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.dry_run);
        assert_eq!(args.leverage, 5);
    }

    #[test]
    fn test_evaluate_requires_symbol() {
        assert!(Cli::try_parse_from(["momentum", "evaluate"]).is_err());
    }
}
