//! Fans independent backtest runs out across the blocking-thread pool.
//!
//! Generalizes the source organization's engine-isolation discipline — two
//! live-trading engines must never share a broker key or allocation cap,
//! enforced by requiring each engine's credentials be loaded fresh from its
//! own construction-time config rather than from ambient global state —
//! into run-state isolation: two sweep tasks must never share a mutable
//! `BacktestConfig`, `Strategy`, or `BarSeries`. Each task builds its own
//! from scratch inside its own blocking closure, so the scheduling order
//! threads actually run in can never influence any individual result.

use std::sync::Arc;

use btk_bar::BarSeries;
use btk_engine::{BacktestConfig, ReplayEngine, ReplayResult};
use btk_strategy::Strategy;
use serde_json::Value;

/// One independent run to perform: a strategy parameter set against a
/// symbol, each runs are synchronous/CPU-bound so it executes via
/// `spawn_blocking` rather than on the async executor directly.
pub struct SweepTask {
    pub label: String,
    pub symbol: String,
    pub params: Value,
}

pub struct SweepOutcome {
    pub label: String,
    pub symbol: String,
    pub result: Result<ReplayResult, String>,
}

type BarsProvider = dyn Fn(&str) -> BarSeries + Send + Sync;
type StrategyFactory = dyn Fn(&Value) -> Box<dyn Strategy> + Send + Sync;

pub struct SweepScheduler {
    base_config: BacktestConfig,
    bars_provider: Arc<BarsProvider>,
    strategy_factory: Arc<StrategyFactory>,
}

impl SweepScheduler {
    /// `base_config` supplies every field except `symbol`, which each task
    /// overrides with its own. `bars_provider` and `strategy_factory` are
    /// called once per task, inside that task's own blocking closure, so
    /// they must not close over any engine/portfolio state of their own.
    pub fn new(
        base_config: BacktestConfig,
        bars_provider: impl Fn(&str) -> BarSeries + Send + Sync + 'static,
        strategy_factory: impl Fn(&Value) -> Box<dyn Strategy> + Send + Sync + 'static,
    ) -> SweepScheduler {
        SweepScheduler { base_config, bars_provider: Arc::new(bars_provider), strategy_factory: Arc::new(strategy_factory) }
    }

    /// Runs every task to completion and returns their outcomes in the
    /// order `tasks` was given, regardless of completion order.
    pub async fn run(&self, tasks: Vec<SweepTask>) -> Vec<SweepOutcome> {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let mut config = self.base_config.clone();
            config.symbol = task.symbol.clone();
            let bars_provider = Arc::clone(&self.bars_provider);
            let strategy_factory = Arc::clone(&self.strategy_factory);

            handles.push(tokio::task::spawn_blocking(move || {
                let bars = bars_provider(&config.symbol);
                let strategy = strategy_factory(&task.params);
                let mut engine = ReplayEngine::new(config.clone(), strategy);
                let result = engine.run(&bars).map_err(|e| e.to_string());
                (task.label, task.symbol, result)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((label, symbol, result)) => outcomes.push(SweepOutcome { label, symbol, result }),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "sweep task panicked");
                    outcomes.push(SweepOutcome { label: "panicked".to_string(), symbol: "unknown".to_string(), result: Err(join_err.to_string()) });
                }
            }
        }

        outcomes
    }
}
