//! Durable, deduplicated storage of bars plus a range-summary index.
//!
//! Backed by `sqlx` against SQLite instead of the source organization's
//! Postgres deployment — see the module-level note on `store` for why the
//! insert-vs-update detection trick had to change shape.

use std::fmt;

use btk_bar::{Bar, BarSeries, Interval, Micros};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

#[derive(Debug)]
pub enum CacheError {
    Storage(String),
    Corrupt(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Storage(msg) => write!(f, "cache storage error: {msg}"),
            CacheError::Corrupt(msg) => write!(f, "cache row failed to decode: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::Storage(e.to_string())
    }
}

/// Opens (creating if absent) a SQLite database at `url` — typically
/// `sqlite://path/to/file.db` or `sqlite::memory:` for tests.
pub async fn connect(url: &str) -> Result<SqlitePool, CacheError> {
    let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
    Ok(pool)
}

/// Runs the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| CacheError::Storage(e.to_string()))?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub inserted: u64,
    pub updated: u64,
}

pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    pub fn new(pool: SqlitePool) -> CacheStore {
        CacheStore { pool }
    }

    /// Idempotent upsert of `bars` keyed by `(symbol, interval, timestamp)`,
    /// plus a `bar_summaries` row covering `[min_ts, max_ts]` for this call.
    ///
    /// SQLite's `RETURNING` clause has no `xmax`-style system column, so
    /// insert-vs-update is detected with an explicit `SELECT` inside the
    /// same transaction immediately before the `INSERT ... ON CONFLICT DO
    /// UPDATE`, rather than in the single round trip the Postgres version
    /// of this store used.
    pub async fn store(
        &self,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
        source: &str,
        fetched_at: i64,
    ) -> Result<StoreStats, CacheError> {
        if bars.is_empty() {
            return Ok(StoreStats::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut stats = StoreStats::default();
        let mut min_ts = i64::MAX;
        let mut max_ts = i64::MIN;

        for bar in bars {
            min_ts = min_ts.min(bar.timestamp);
            max_ts = max_ts.max(bar.timestamp);

            let existing: Option<i64> = sqlx::query_scalar(
                "select 1 from bars where symbol = ?1 and interval = ?2 and timestamp = ?3",
            )
            .bind(symbol)
            .bind(interval.as_str())
            .bind(bar.timestamp)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                insert into bars (
                    symbol, interval, timestamp,
                    open_micros, high_micros, low_micros, close_micros,
                    volume, synthetic, source, fetched_at, metadata
                )
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '{}')
                on conflict (symbol, interval, timestamp) do update set
                    open_micros  = excluded.open_micros,
                    high_micros  = excluded.high_micros,
                    low_micros   = excluded.low_micros,
                    close_micros = excluded.close_micros,
                    volume       = excluded.volume,
                    synthetic    = excluded.synthetic,
                    source       = excluded.source,
                    fetched_at   = excluded.fetched_at
                "#,
            )
            .bind(symbol)
            .bind(interval.as_str())
            .bind(bar.timestamp)
            .bind(bar.open.raw())
            .bind(bar.high.raw())
            .bind(bar.low.raw())
            .bind(bar.close.raw())
            .bind(bar.volume)
            .bind(bar.synthetic as i64)
            .bind(source)
            .bind(fetched_at)
            .execute(&mut *tx)
            .await?;

            if existing.is_some() {
                stats.updated += 1;
            } else {
                stats.inserted += 1;
            }
        }

        sqlx::query(
            r#"
            insert into bar_summaries (symbol, interval, start_ts, end_ts, count, source, fetched_at, metadata)
            values (?1, ?2, ?3, ?4, ?5, ?6, ?7, '{}')
            on conflict (symbol, interval, start_ts, end_ts) do update set
                count      = excluded.count,
                source     = excluded.source,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(symbol)
        .bind(interval.as_str())
        .bind(min_ts)
        .bind(max_ts)
        .bind(bars.len() as i64)
        .bind(source)
        .bind(fetched_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stats)
    }

    /// Bars for `(symbol, interval)` within `range` (inclusive), or all
    /// cached bars for that pair if `range` is `None`. Always ascending.
    pub async fn get(
        &self,
        symbol: &str,
        interval: Interval,
        range: Option<(i64, i64)>,
    ) -> Result<BarSeries, CacheError> {
        let rows = match range {
            Some((start, end)) => {
                sqlx::query(
                    "select * from bars where symbol = ?1 and interval = ?2 and timestamp between ?3 and ?4 order by timestamp asc",
                )
                .bind(symbol)
                .bind(interval.as_str())
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "select * from bars where symbol = ?1 and interval = ?2 order by timestamp asc",
                )
                .bind(symbol)
                .bind(interval.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut bars = Vec::with_capacity(rows.len());
        for row in &rows {
            bars.push(row_to_bar(row, symbol, interval)?);
        }
        BarSeries::from_sorted(bars).map_err(|e| CacheError::Corrupt(format!("{e}")))
    }

    /// `true` if any summary record's `[start_ts, end_ts]` overlaps `range`.
    pub async fn has(&self, symbol: &str, interval: Interval, range: (i64, i64)) -> Result<bool, CacheError> {
        let (start, end) = range;
        let hit: Option<i64> = sqlx::query_scalar(
            "select 1 from bar_summaries where symbol = ?1 and interval = ?2 and start_ts <= ?3 and end_ts >= ?4 limit 1",
        )
        .bind(symbol)
        .bind(interval.as_str())
        .bind(end)
        .bind(start)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hit.is_some())
    }

    /// Removes bars (and now-empty-of-coverage summaries) older than `before_ts`.
    pub async fn cleanup(&self, before_ts: i64) -> Result<u64, CacheError> {
        let result = sqlx::query("delete from bars where timestamp < ?1").bind(before_ts).execute(&self.pool).await?;
        sqlx::query("delete from bar_summaries where end_ts < ?1").bind(before_ts).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn row_to_bar(row: &SqliteRow, symbol: &str, interval: Interval) -> Result<Bar, CacheError> {
    let timestamp: i64 = row.try_get("timestamp").map_err(|e| CacheError::Corrupt(e.to_string()))?;
    let open: i64 = row.try_get("open_micros").map_err(|e| CacheError::Corrupt(e.to_string()))?;
    let high: i64 = row.try_get("high_micros").map_err(|e| CacheError::Corrupt(e.to_string()))?;
    let low: i64 = row.try_get("low_micros").map_err(|e| CacheError::Corrupt(e.to_string()))?;
    let close: i64 = row.try_get("close_micros").map_err(|e| CacheError::Corrupt(e.to_string()))?;
    let volume: i64 = row.try_get("volume").map_err(|e| CacheError::Corrupt(e.to_string()))?;

    Bar::new(
        symbol.to_string(),
        interval,
        timestamp,
        Micros::new(open),
        Micros::new(high),
        Micros::new(low),
        Micros::new(close),
        volume,
    )
    .map_err(|e| CacheError::Corrupt(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use btk_bar::Micros;

    async fn fresh_store() -> CacheStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        CacheStore::new(pool)
    }

    fn bar(symbol: &str, ts: i64, price: i64) -> Bar {
        Bar::new(symbol, Interval::M5, ts, Micros::new(price), Micros::new(price), Micros::new(price), Micros::new(price), 10).unwrap()
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let store = fresh_store().await;
        let bars = vec![bar("AAPL", 100, 1_000_000), bar("AAPL", 200, 1_010_000)];
        let stats = store.store("AAPL", Interval::M5, &bars, "test", 1).await.unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.updated, 0);

        let series = store.get("AAPL", Interval::M5, None).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().timestamp, 100);
    }

    #[tokio::test]
    async fn storing_same_key_twice_is_an_update() {
        let store = fresh_store().await;
        let first = vec![bar("AAPL", 100, 1_000_000)];
        store.store("AAPL", Interval::M5, &first, "test", 1).await.unwrap();

        let second = vec![bar("AAPL", 100, 2_000_000)];
        let stats = store.store("AAPL", Interval::M5, &second, "test", 2).await.unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 1);

        let series = store.get("AAPL", Interval::M5, None).await.unwrap();
        assert_eq!(series.first().unwrap().close, Micros::new(2_000_000));
    }

    #[tokio::test]
    async fn has_uses_summary_overlap() {
        let store = fresh_store().await;
        let bars = vec![bar("AAPL", 100, 1_000_000), bar("AAPL", 500, 1_000_000)];
        store.store("AAPL", Interval::M5, &bars, "test", 1).await.unwrap();

        assert!(store.has("AAPL", Interval::M5, (200, 300)).await.unwrap());
        assert!(!store.has("AAPL", Interval::M5, (600, 700)).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_removes_bars_before_cutoff() {
        let store = fresh_store().await;
        let bars = vec![bar("AAPL", 100, 1_000_000), bar("AAPL", 9_999_999, 1_000_000)];
        store.store("AAPL", Interval::M5, &bars, "test", 1).await.unwrap();

        let removed = store.cleanup(1000).await.unwrap();
        assert_eq!(removed, 1);

        let series = store.get("AAPL", Interval::M5, None).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first().unwrap().timestamp, 9_999_999);
    }
}
