//! Shared scenario-building fixtures for end-to-end backtesting tests:
//! synthetic bar series, always-on calendars, and fresh in-memory stores,
//! so every crate's integration tests can assemble a runnable scenario in
//! one call instead of re-deriving session/timestamp plumbing by hand.

use anyhow::{Context, Result};
use btk_bar::{Bar, BarSeries, Interval, Micros};
use btk_clock::{HolidayCalendar, MarketHours};
use btk_engine::BacktestConfig;
use sqlx::SqlitePool;

/// Loads a bar series from a CSV with columns
/// `timestamp,open,high,low,close,volume`, enforcing strictly ascending,
/// OHLC-valid bars.
pub fn load_bars_csv(path: &str, symbol: &str, interval: Interval) -> Result<BarSeries> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open bars csv: {path}"))?;
    let mut bars = Vec::new();

    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("read bar record from {path}"))?;
        let timestamp: i64 = rec[0].parse().context("parse timestamp")?;
        let open = parse_micros(&rec[1])?;
        let high = parse_micros(&rec[2])?;
        let low = parse_micros(&rec[3])?;
        let close = parse_micros(&rec[4])?;
        let volume: i64 = rec[5].parse().context("parse volume")?;
        bars.push(Bar::new(symbol, interval, timestamp, open, high, low, close, volume)?);
    }

    BarSeries::from_sorted(bars).map_err(|e| anyhow::anyhow!("{e}"))
}

fn parse_micros(field: &str) -> Result<Micros> {
    let v: f64 = field.parse().context("parse price")?;
    Micros::from_f64(v).context("price out of range")
}

/// A `BacktestConfig` over an always-open calendar, so scenario bars don't
/// need to land inside real NYSE session windows to be evaluated.
pub fn always_on_config(symbol: &str, start: i64, end: i64, initial_capital: f64) -> BacktestConfig {
    let mut config = BacktestConfig::new(symbol, start, end, Micros::from_f64(initial_capital).expect("fixture capital in range"));
    config.market_hours = MarketHours::always_on();
    config.holidays = HolidayCalendar::empty();
    config
}

/// One bar every 60 seconds starting at `base`, `count` bars, each built by
/// `make(index) -> (high, low, close, volume)` with `open` taken from the
/// previous bar's close (or `close` of bar 0 for the first bar).
pub fn minute_bars(symbol: &str, base: i64, count: usize, mut make: impl FnMut(usize) -> (f64, f64, f64, i64)) -> BarSeries {
    let mut bars = Vec::with_capacity(count);
    let mut prev_close = None;
    for i in 0..count {
        let (high, low, close, volume) = make(i);
        let open = prev_close.unwrap_or(close);
        let bar = Bar::new(
            symbol,
            Interval::M1,
            base + (i as i64) * 60,
            Micros::from_f64(open).unwrap(),
            Micros::from_f64(high).unwrap(),
            Micros::from_f64(low).unwrap(),
            Micros::from_f64(close).unwrap(),
            volume,
        )
        .expect("fixture bar satisfies OHLC invariant");
        prev_close = Some(close);
        bars.push(bar);
    }
    BarSeries::from_sorted(bars).expect("fixture timestamps strictly ascending")
}

/// A fresh, migrated, in-memory bar cache for tests.
pub async fn fresh_cache_pool() -> SqlitePool {
    let pool = btk_cache::connect("sqlite::memory:").await.expect("open in-memory cache");
    btk_cache::migrate(&pool).await.expect("migrate in-memory cache");
    pool
}

/// A fresh, migrated, in-memory report archive for tests.
pub async fn fresh_archive_pool() -> SqlitePool {
    let pool = btk_archive::connect("sqlite::memory:").await.expect("open in-memory archive");
    btk_archive::migrate(&pool).await.expect("migrate in-memory archive");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minute_bars_chains_open_to_previous_close() {
        let series = minute_bars("AAPL", 0, 3, |i| (101.0 + i as f64, 99.0, 100.0 + i as f64, 1000));
        let bars = series.bars();
        assert_eq!(bars[1].open, bars[0].close);
        assert_eq!(bars[2].open, bars[1].close);
    }

    #[test]
    fn load_bars_csv_parses_and_orders_rows() {
        let mut file = tempfile();
        writeln!(file.1, "0,100,101,99,100.5,1000").unwrap();
        writeln!(file.1, "60,100.5,102,100,101.5,1200").unwrap();
        drop(file.1);

        let series = load_bars_csv(&file.0, "AAPL", Interval::M1).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().timestamp, 0);
        std::fs::remove_file(&file.0).ok();
    }

    fn tempfile() -> (String, std::fs::File) {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("btk-testkit-{nanos}.csv")).to_str().unwrap().to_string();
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
