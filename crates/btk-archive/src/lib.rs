//! Append-only archive of completed backtest runs.
//!
//! Mirrors the source organization's `runs`/`md_quality_reports` pattern: one
//! `sqlx`-managed table, insert-only from the application's point of view,
//! with the large variable-shaped fields (`parameters`, `performance`,
//! `trades`) stored as JSON blobs so the schema never has to evolve when a
//! strategy's parameter set changes. Built directly on `btk-cache`'s own
//! SQLite/`sqlx` pattern rather than re-deriving one from scratch.

use std::fmt;

use btk_analyzer::PerformanceMetrics;
use btk_bar::{Micros, Trade};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug)]
pub enum ArchiveError {
    Storage(String),
    Corrupt(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Storage(msg) => write!(f, "archive storage error: {msg}"),
            ArchiveError::Corrupt(msg) => write!(f, "archive row failed to decode: {msg}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<sqlx::Error> for ArchiveError {
    fn from(e: sqlx::Error) -> Self {
        ArchiveError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(e: serde_json::Error) -> Self {
        ArchiveError::Corrupt(e.to_string())
    }
}

/// One completed backtest run, ready to persist. `parameters` is left as an
/// opaque JSON value since strategy parameter shapes vary per strategy and
/// the archive schema must not change when they do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub strategy_name: String,
    pub symbol: String,
    pub start_date: i64,
    pub end_date: i64,
    pub initial_capital: Micros,
    pub final_capital: Micros,
    pub parameters: serde_json::Value,
    pub performance: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub created_at: i64,
}

impl BacktestReport {
    pub fn new(
        strategy_name: impl Into<String>,
        symbol: impl Into<String>,
        start_date: i64,
        end_date: i64,
        initial_capital: Micros,
        final_capital: Micros,
        parameters: serde_json::Value,
        performance: PerformanceMetrics,
        trades: Vec<Trade>,
        created_at: i64,
    ) -> BacktestReport {
        BacktestReport {
            run_id: Uuid::new_v4(),
            strategy_name: strategy_name.into(),
            symbol: symbol.into(),
            start_date,
            end_date,
            initial_capital,
            final_capital,
            parameters,
            performance,
            trades,
            created_at,
        }
    }
}

/// Opens (creating if absent) a SQLite database at `url` — typically
/// `sqlite://path/to/file.db` or `sqlite::memory:` for tests.
pub async fn connect(url: &str) -> Result<SqlitePool, ArchiveError> {
    let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
    Ok(pool)
}

/// Runs the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), ArchiveError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| ArchiveError::Storage(e.to_string()))?;
    Ok(())
}

pub struct ArchiveStore {
    pool: SqlitePool,
}

impl ArchiveStore {
    pub fn new(pool: SqlitePool) -> ArchiveStore {
        ArchiveStore { pool }
    }

    /// Appends a report. Never overwrites — `run_id` is freshly generated per
    /// report, so there is no update path, matching the append-only contract.
    pub async fn insert(&self, report: &BacktestReport) -> Result<(), ArchiveError> {
        let parameters = serde_json::to_string(&report.parameters)?;
        let performance = serde_json::to_string(&report.performance)?;
        let trades = serde_json::to_string(&report.trades)?;

        sqlx::query(
            r#"
            insert into backtest_reports (
                run_id, strategy_name, symbol, start_date, end_date,
                initial_capital, final_capital, parameters, performance, trades,
                hit_rate, profit_factor, metadata, created_at
            )
            values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, '{}', ?13)
            "#,
        )
        .bind(report.run_id.to_string())
        .bind(&report.strategy_name)
        .bind(&report.symbol)
        .bind(report.start_date)
        .bind(report.end_date)
        .bind(report.initial_capital.raw())
        .bind(report.final_capital.raw())
        .bind(parameters)
        .bind(performance)
        .bind(trades)
        .bind(report.performance.hit_rate)
        .bind(report.performance.profit_factor)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(run_id = %report.run_id, strategy = %report.strategy_name, symbol = %report.symbol, "archived backtest report");
        Ok(())
    }

    /// Most recent `limit` reports for `(strategy, symbol)`, newest first.
    pub async fn query_recent(&self, strategy: &str, symbol: &str, limit: i64) -> Result<Vec<BacktestReport>, ArchiveError> {
        let rows = sqlx::query(
            "select * from backtest_reports where strategy_name = ?1 and symbol = ?2 order by created_at desc limit ?3",
        )
        .bind(strategy)
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_report).collect()
    }

    /// Reports meeting both thresholds, best-by-profit-factor first, capped
    /// at `limit`.
    pub async fn query_by_thresholds(&self, min_hit_rate: f64, min_profit_factor: f64, limit: i64) -> Result<Vec<BacktestReport>, ArchiveError> {
        let rows = sqlx::query(
            "select * from backtest_reports where hit_rate >= ?1 and profit_factor >= ?2 order by profit_factor desc limit ?3",
        )
        .bind(min_hit_rate)
        .bind(min_profit_factor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_report).collect()
    }

    /// Deletes every report created before `before_ts`. Old results are
    /// otherwise retained forever; this is the only removal path.
    pub async fn cleanup(&self, before_ts: i64) -> Result<u64, ArchiveError> {
        let result = sqlx::query("delete from backtest_reports where created_at < ?1").bind(before_ts).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<BacktestReport, ArchiveError> {
    let run_id: String = row.try_get("run_id").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let run_id = Uuid::parse_str(&run_id).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let strategy_name: String = row.try_get("strategy_name").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let symbol: String = row.try_get("symbol").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let start_date: i64 = row.try_get("start_date").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let end_date: i64 = row.try_get("end_date").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let initial_capital: i64 = row.try_get("initial_capital").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let final_capital: i64 = row.try_get("final_capital").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let parameters: String = row.try_get("parameters").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let performance: String = row.try_get("performance").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let trades: String = row.try_get("trades").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let created_at: i64 = row.try_get("created_at").map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    Ok(BacktestReport {
        run_id,
        strategy_name,
        symbol,
        start_date,
        end_date,
        initial_capital: Micros::new(initial_capital),
        final_capital: Micros::new(final_capital),
        parameters: serde_json::from_str(&parameters)?,
        performance: serde_json::from_str(&performance)?,
        trades: serde_json::from_str(&trades)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use btk_analyzer::PerformanceMetrics;

    async fn fresh_store() -> ArchiveStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        ArchiveStore::new(pool)
    }

    fn report(strategy: &str, symbol: &str, hit_rate: f64, profit_factor: f64, created_at: i64) -> BacktestReport {
        let mut perf = PerformanceMetrics::empty();
        perf.hit_rate = hit_rate;
        perf.profit_factor = profit_factor;
        BacktestReport::new(
            strategy,
            symbol,
            0,
            3600,
            Micros::from_f64(100_000.0).unwrap(),
            Micros::from_f64(105_000.0).unwrap(),
            serde_json::json!({"min_range_size": 0.002}),
            perf,
            Vec::new(),
            created_at,
        )
    }

    #[tokio::test]
    async fn insert_then_query_recent_round_trips() {
        let store = fresh_store().await;
        store.insert(&report("orb", "AAPL", 60.0, 1.5, 100)).await.unwrap();
        store.insert(&report("orb", "AAPL", 55.0, 1.2, 200)).await.unwrap();

        let recent = store.query_recent("orb", "AAPL", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].created_at, 200);
        assert_eq!(recent[1].created_at, 100);
    }

    #[tokio::test]
    async fn query_by_thresholds_filters_and_ranks_by_profit_factor() {
        let store = fresh_store().await;
        store.insert(&report("orb", "AAPL", 60.0, 1.5, 100)).await.unwrap();
        store.insert(&report("orb", "AAPL", 40.0, 3.0, 200)).await.unwrap();
        store.insert(&report("orb", "MSFT", 70.0, 2.0, 300)).await.unwrap();

        let ranked = store.query_by_thresholds(50.0, 1.0, 10).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].symbol, "MSFT");
        assert_eq!(ranked[1].symbol, "AAPL");
    }

    #[tokio::test]
    async fn cleanup_removes_reports_before_cutoff() {
        let store = fresh_store().await;
        store.insert(&report("orb", "AAPL", 60.0, 1.5, 100)).await.unwrap();
        store.insert(&report("orb", "AAPL", 60.0, 1.5, 9_999_999)).await.unwrap();

        let removed = store.cleanup(1000).await.unwrap();
        assert_eq!(removed, 1);

        let recent = store.query_recent("orb", "AAPL", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].created_at, 9_999_999);
    }
}
