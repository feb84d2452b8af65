//! `btk run`: loads a layered config, fetches or reads cached bars, drives
//! one backtest, archives the report, and prints a summary.

use anyhow::{Context, Result};
use btk_analyzer::{build_round_trips, compute_metrics};
use btk_archive::{ArchiveStore, BacktestReport};
use btk_bar::Interval;
use btk_cache::CacheStore;
use btk_config::build_backtest_config;
use btk_engine::ReplayEngine;

use chrono::Utc;

use crate::strategies::built_in_registry;

pub struct RunArgs {
    pub config_paths: Vec<String>,
    pub strategy: String,
    pub symbol: String,
    pub interval: Interval,
    pub cache_url: String,
    pub archive_url: String,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let path_refs: Vec<&str> = args.config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = btk_config::load_layered_yaml(&path_refs)?;

    let mut config = build_backtest_config(&loaded.config_json).context("invalid backtest config")?;
    config.symbol = args.symbol.clone();

    let registry = built_in_registry();
    let strategy = registry.instantiate(&args.strategy).with_context(|| format!("unknown strategy '{}'", args.strategy))?;

    let cache_pool = btk_cache::connect(&args.cache_url).await?;
    btk_cache::migrate(&cache_pool).await?;
    let cache = CacheStore::new(cache_pool);
    let bars = cache.get(&args.symbol, args.interval, Some((config.start, config.end))).await.context("reading cached bars")?;

    tracing::info!(strategy = %args.strategy, symbol = %args.symbol, bars = bars.len(), "starting backtest run");

    let mut engine = ReplayEngine::new(config.clone(), strategy);
    let result = engine.run(&bars).context("replay failed")?;

    let round_trips = build_round_trips(&result.trades);
    let metrics = compute_metrics(&round_trips, &result.equity_curve, config.initial_capital);

    println!("strategy={} symbol={}", args.strategy, args.symbol);
    println!("trades={} hit_rate={:.2} profit_factor={:.2}", result.trades.len(), metrics.hit_rate, metrics.profit_factor);
    println!("total_pl={} max_drawdown_percent={:.2}", metrics.total_pl.raw(), metrics.max_drawdown_percent);
    println!("config_hash={}", loaded.config_hash);

    let archive_pool = btk_archive::connect(&args.archive_url).await?;
    btk_archive::migrate(&archive_pool).await?;
    let archive = ArchiveStore::new(archive_pool);
    let report = BacktestReport::new(
        args.strategy.clone(),
        args.symbol.clone(),
        config.start,
        config.end,
        config.initial_capital,
        result.final_portfolio.total_value(),
        loaded.config_json.clone(),
        metrics,
        result.trades,
        Utc::now().timestamp(),
    );
    archive.insert(&report).await.context("archiving report")?;
    println!("run_id={}", report.run_id);

    Ok(())
}
