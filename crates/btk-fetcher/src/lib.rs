//! External data fetcher: rate-limited, retrying client that normalizes an
//! intraday time-series provider's responses into [`btk_bar::Bar`]s.
//!
//! One fetcher type (`TimeSeriesFetcher`) parameterized by [`RateLimitConfig`],
//! not two near-duplicate implementations for different subscription tiers —
//! the tier is a value, not a type.

mod provider;
mod rate_limit;

pub use provider::{AlphaVantageProvider, MockProvider, ProviderBar};
pub use rate_limit::RateLimitConfig;

use std::fmt;

use async_trait::async_trait;
use btk_bar::{Bar, BarSeries, Interval};
use rate_limit::RateLimiter;

/// A `(year, month)` pair identifying one month of history to fetch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> YearMonth {
        debug_assert!((1..=12).contains(&month));
        YearMonth { year, month }
    }

    /// The next calendar month, carrying the year forward at December.
    pub fn next(self) -> YearMonth {
        if self.month == 12 {
            YearMonth::new(self.year + 1, 1)
        } else {
            YearMonth::new(self.year, self.month + 1)
        }
    }

    pub fn as_vendor_str(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_vendor_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Vendor returned a structured error payload. Terminal, not retried.
    Vendor(String),
    /// Vendor signaled a rate-limit condition. Retried with backoff.
    RateLimited(String),
    /// Network/transport failure. Retried with backoff.
    Transport(String),
    /// The per-day quota was already exhausted before the request was sent.
    DailyLimit,
    /// A bar in the response failed basic OHLCV validation.
    Malformed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Vendor(msg) => write!(f, "vendor error: {msg}"),
            FetchError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::DailyLimit => write!(f, "daily request quota exhausted"),
            FetchError::Malformed(msg) => write!(f, "malformed bar: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Pluggable historical-data provider. Implementations do the HTTP call and
/// vendor-specific JSON parsing; everything above this trait — rate limiting,
/// retry, month-range stitching — is shared.
#[async_trait]
pub trait HistoricalProvider: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_month_raw(
        &self,
        symbol: &str,
        interval: Interval,
        month: YearMonth,
    ) -> Result<Vec<ProviderBar>, FetchError>;
}

/// Wraps a [`HistoricalProvider`] with rate limiting and retry-with-backoff,
/// and normalizes the provider's decimal-string bars into [`btk_bar::Bar`].
pub struct TimeSeriesFetcher<P: HistoricalProvider> {
    provider: P,
    limiter: RateLimiter,
    retry_attempts: u32,
}

impl<P: HistoricalProvider> TimeSeriesFetcher<P> {
    pub fn new(provider: P, rate_limit: RateLimitConfig) -> TimeSeriesFetcher<P> {
        TimeSeriesFetcher { provider, limiter: RateLimiter::new(rate_limit), retry_attempts: 3 }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Fetches one month of bars for `symbol`, ascending by timestamp.
    pub async fn fetch_month(
        &mut self,
        symbol: &str,
        interval: Interval,
        month: YearMonth,
    ) -> Result<BarSeries, FetchError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await?;

            match self.provider.fetch_month_raw(symbol, interval, month).await {
                Ok(raw) => return normalize(symbol, interval, raw),
                Err(FetchError::Vendor(msg)) => return Err(FetchError::Vendor(msg)),
                Err(FetchError::Malformed(msg)) => return Err(FetchError::Malformed(msg)),
                Err(retryable) => {
                    attempt += 1;
                    if attempt > self.retry_attempts {
                        return Err(retryable);
                    }
                    tracing::warn!(
                        provider = self.provider.source_name(),
                        symbol,
                        %month,
                        attempt,
                        error = %retryable,
                        "retrying after transient fetch failure"
                    );
                    let backoff = self.limiter.backoff_duration(attempt);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Fetches every month in `[start, end]` inclusive, sequentially, and
    /// concatenates the results into one ascending series.
    pub async fn fetch_range(
        &mut self,
        symbol: &str,
        interval: Interval,
        start: YearMonth,
        end: YearMonth,
    ) -> Result<BarSeries, FetchError> {
        debug_assert!(start <= end);
        let mut all_bars = Vec::new();
        let mut cursor = start;
        loop {
            let chunk = self.fetch_month(symbol, interval, cursor).await?;
            all_bars.extend(chunk.into_vec());
            if cursor == end {
                break;
            }
            cursor = cursor.next();
        }
        Ok(BarSeries::from_unsorted_dedup(all_bars))
    }
}

fn normalize(symbol: &str, interval: Interval, raw: Vec<ProviderBar>) -> Result<BarSeries, FetchError> {
    let mut bars = Vec::with_capacity(raw.len());
    for pb in raw {
        let open = btk_bar::Micros::parse_decimal(&pb.open)
            .map_err(|e| FetchError::Malformed(format!("open: {e}")))?;
        let high = btk_bar::Micros::parse_decimal(&pb.high)
            .map_err(|e| FetchError::Malformed(format!("high: {e}")))?;
        let low = btk_bar::Micros::parse_decimal(&pb.low)
            .map_err(|e| FetchError::Malformed(format!("low: {e}")))?;
        let close = btk_bar::Micros::parse_decimal(&pb.close)
            .map_err(|e| FetchError::Malformed(format!("close: {e}")))?;

        let bar = Bar::new(symbol.to_string(), interval, pb.timestamp, open, high, low, close, pb.volume)
            .map_err(|e| FetchError::Malformed(format!("{e}")))?;
        bars.push(bar);
    }
    // Vendors return reverse-chronological order; output must be ascending.
    bars.sort_by_key(|b| b.timestamp);
    BarSeries::from_sorted(bars).map_err(|e| FetchError::Malformed(format!("{e}")))
}
