//! Data Manager: orchestrates the cache store and the external fetcher to
//! satisfy a `(symbol, interval, [start, end])` request with a contiguous,
//! gap-filled bar series.

use std::fmt;

use btk_bar::{Bar, BarSeries, Interval};
use btk_cache::{CacheError, CacheStore};
use btk_clock::{HolidayCalendar, MarketHours};
use btk_fetcher::{FetchError, HistoricalProvider, TimeSeriesFetcher, YearMonth};

#[derive(Debug)]
pub enum DataError {
    Cache(String),
    Fetch(String),
    Validation(Vec<String>),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Cache(msg) => write!(f, "cache error: {msg}"),
            DataError::Fetch(msg) => write!(f, "fetch error: {msg}"),
            DataError::Validation(reasons) => write!(f, "validation failed: {}", reasons.join("; ")),
        }
    }
}

impl std::error::Error for DataError {}

impl From<CacheError> for DataError {
    fn from(e: CacheError) -> Self {
        DataError::Cache(e.to_string())
    }
}

impl From<FetchError> for DataError {
    fn from(e: FetchError) -> Self {
        DataError::Fetch(e.to_string())
    }
}

/// Inclusive `(year, month)` range as a list of calendar months, built with
/// immutable tuples and explicit carry — never a date object mutated across
/// a year boundary in place.
pub fn month_list(start_ts: i64, end_ts: i64) -> Vec<YearMonth> {
    let (y0, m0, _) = btk_clock::epoch_secs_to_ymd(start_ts);
    let (y1, m1, _) = btk_clock::epoch_secs_to_ymd(end_ts);
    let end = YearMonth::new(y1 as i32, m1 as u32);
    let mut out = Vec::new();
    let mut cursor = YearMonth::new(y0 as i32, m0 as u32);
    loop {
        out.push(cursor);
        if cursor == end {
            break;
        }
        cursor = cursor.next();
    }
    out
}

pub struct DataManager<P: HistoricalProvider> {
    cache: CacheStore,
    fetcher: TimeSeriesFetcher<P>,
    market_hours: MarketHours,
    holidays: HolidayCalendar,
    source_label: &'static str,
}

impl<P: HistoricalProvider> DataManager<P> {
    pub fn new(
        cache: CacheStore,
        fetcher: TimeSeriesFetcher<P>,
        market_hours: MarketHours,
        holidays: HolidayCalendar,
    ) -> DataManager<P> {
        DataManager { cache, fetcher, market_hours, holidays, source_label: "fetched" }
    }

    /// Satisfies the request from cache when possible, otherwise fetches
    /// every covering month, stores it, and re-reads from cache (the cache
    /// is authoritative on a tie per the store's last-write-wins rule).
    /// Gaps that span session time are filled with synthetic flat bars.
    pub async fn get_series(
        &mut self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
        force_refresh: bool,
    ) -> Result<BarSeries, DataError> {
        let have_cached = !force_refresh && self.cache.has(symbol, interval, (start_ts, end_ts)).await?;

        if !have_cached {
            for month in month_list(start_ts, end_ts) {
                let fetched = self.fetcher.fetch_month(symbol, interval, month).await?;
                if fetched.is_empty() {
                    continue;
                }
                self.cache
                    .store(symbol, interval, &fetched.into_vec(), self.source_label, start_ts)
                    .await?;
            }
        }

        let raw = self.cache.get(symbol, interval, Some((start_ts, end_ts))).await?;
        let filled = fill_gaps(raw.into_vec(), &self.market_hours, &self.holidays, interval);
        let series = BarSeries::from_sorted(filled).map_err(|e| DataError::Validation(vec![e.to_string()]))?;
        Ok(series.slice_range(start_ts, end_ts))
    }
}

/// Inserts a synthetic flat bar at every market-hours slot strictly between
/// two consecutive observed bars whose gap exceeds one interval. Gaps that
/// fall entirely in non-trading time (weekend, holiday, outside configured
/// market hours) are left alone.
fn fill_gaps(bars: Vec<Bar>, market_hours: &MarketHours, holidays: &HolidayCalendar, interval: Interval) -> Vec<Bar> {
    if bars.len() < 2 {
        return bars;
    }
    let step = interval.seconds();
    let mut out = Vec::with_capacity(bars.len());
    out.push(bars[0].clone());

    for pair in bars.windows(2) {
        let prev = &pair[0];
        let next = &pair[1];
        let mut ts = prev.timestamp + step;
        while ts < next.timestamp {
            if market_hours.is_market_hours(ts, holidays) {
                out.push(Bar::synthetic_fill(prev.symbol.clone(), interval, ts, prev.close));
            }
            ts += step;
        }
        out.push(next.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use btk_bar::Micros;

    #[test]
    fn month_list_spans_a_single_year_boundary() {
        // 2023-12-15 to 2024-02-10
        let start_ts = 1_702_598_400;
        let end_ts = 1_707_523_200;
        let months = month_list(start_ts, end_ts);
        assert_eq!(months, vec![YearMonth::new(2023, 12), YearMonth::new(2024, 1), YearMonth::new(2024, 2)]);
    }

    #[test]
    fn month_list_single_month_has_one_entry() {
        let start_ts = 1_704_067_200; // 2024-01-01
        let end_ts = 1_705_968_000; // 2024-01-23
        assert_eq!(month_list(start_ts, end_ts), vec![YearMonth::new(2024, 1)]);
    }

    #[test]
    fn fill_gaps_skips_overnight_non_trading_span() {
        let mh = MarketHours::nyse_default();
        let hols = HolidayCalendar::us_market_default();
        let close_ts = 1_704_751_200_i64; // 2024-01-08 16:00 ET close
        let next_open_ts = 1_704_810_300_i64; // 2024-01-09 09:35 ET
        let bars = vec![
            Bar::new("AAPL", Interval::M5, close_ts, Micros::new(1), Micros::new(1), Micros::new(1), Micros::new(1), 10).unwrap(),
            Bar::new("AAPL", Interval::M5, next_open_ts, Micros::new(1), Micros::new(1), Micros::new(1), Micros::new(1), 10).unwrap(),
        ];
        let filled = fill_gaps(bars, &mh, &hols, Interval::M5);
        assert_eq!(filled.len(), 2, "no synthetic bars should be inserted across a closed-market gap");
    }

    #[test]
    fn fill_gaps_inserts_synthetic_bars_within_session() {
        let mh = MarketHours::always_on();
        let hols = HolidayCalendar::empty();
        let bars = vec![
            Bar::new("AAPL", Interval::M5, 0, Micros::new(100), Micros::new(100), Micros::new(100), Micros::new(100), 10).unwrap(),
            Bar::new("AAPL", Interval::M5, 900, Micros::new(110), Micros::new(110), Micros::new(110), Micros::new(110), 10).unwrap(),
        ];
        let filled = fill_gaps(bars, &mh, &hols, Interval::M5);
        // 300s interval: missing bars at 300 and 600
        assert_eq!(filled.len(), 4);
        assert!(filled[1].synthetic);
        assert_eq!(filled[1].close, Micros::new(100));
        assert!(filled[2].synthetic);
    }
}
