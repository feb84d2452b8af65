mod commands;
mod strategies;
mod time;

use anyhow::Result;
use btk_bar::Interval;
use clap::{Parser, Subcommand};

const DEFAULT_CACHE_URL: &str = "sqlite://btk_cache.db";
const DEFAULT_ARCHIVE_URL: &str = "sqlite://btk_archive.db";

#[derive(Parser)]
#[command(name = "btk")]
#[command(about = "Backtesting toolkit CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest and archive its report.
    Run {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "5m")]
        interval: String,
    },

    /// Data-pipeline commands.
    Data {
        #[command(subcommand)]
        cmd: DataCmd,
    },

    /// Archive query commands.
    Archive {
        #[command(subcommand)]
        cmd: ArchiveCmd,
    },

    /// Compute a layered config's canonical hash and print the canonical JSON.
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DataCmd {
    /// Fetch a symbol/interval range into the local cache.
    Fetch {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "5m")]
        interval: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
}

#[derive(Subcommand)]
enum ArchiveCmd {
    /// List the most recent archived runs for a strategy/symbol pair.
    Query {
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

fn parse_interval(s: &str) -> Result<Interval> {
    Interval::parse(s).ok_or_else(|| anyhow::anyhow!("invalid --interval '{s}', expected one of 1m/5m/15m/30m/60m"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run { config_paths, strategy, symbol, interval } => {
            commands::run::run(commands::run::RunArgs {
                config_paths,
                strategy,
                symbol,
                interval: parse_interval(&interval)?,
                cache_url: DEFAULT_CACHE_URL.to_string(),
                archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            })
            .await?;
        }

        Commands::Data { cmd: DataCmd::Fetch { symbol, interval, start, end } } => {
            commands::data::fetch(commands::data::FetchArgs {
                symbol,
                interval: parse_interval(&interval)?,
                start,
                end,
                cache_url: DEFAULT_CACHE_URL.to_string(),
            })
            .await?;
        }

        Commands::Archive { cmd: ArchiveCmd::Query { strategy, symbol, limit } } => {
            commands::archive::query(commands::archive::QueryArgs {
                strategy,
                symbol,
                limit,
                archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            })
            .await?;
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = btk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}
