use std::collections::HashMap;

use async_trait::async_trait;
use btk_bar::Interval;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::{FetchError, HistoricalProvider, YearMonth};

/// One OHLCV row as a provider returns it: decimal-string prices so the
/// caller can normalize to `Micros` deterministically (no floats, ever).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBar {
    pub timestamp: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: i64,
}

fn alpha_vantage_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::M1 => "1min",
        Interval::M5 => "5min",
        Interval::M15 => "15min",
        Interval::M30 => "30min",
        Interval::M60 => "60min",
    }
}

/// Historical provider speaking the `TIME_SERIES_INTRADAY` vendor dialect
/// described in the external-interfaces section: query-string request,
/// `"Time Series (<interval>)"` response keyed by `"YYYY-MM-DD HH:MM:SS"`.
#[derive(Debug, Clone)]
pub struct AlphaVantageProvider {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> AlphaVantageProvider {
        AlphaVantageProvider::new_with_base_url(api_key, "https://www.alphavantage.co/query".to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> AlphaVantageProvider {
        AlphaVantageProvider { api_key, http: reqwest::Client::new(), base_url }
    }
}

#[async_trait]
impl HistoricalProvider for AlphaVantageProvider {
    fn source_name(&self) -> &'static str {
        "alphavantage"
    }

    async fn fetch_month_raw(
        &self,
        symbol: &str,
        interval: Interval,
        month: YearMonth,
    ) -> Result<Vec<ProviderBar>, FetchError> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_INTRADAY"),
                ("symbol", symbol),
                ("interval", alpha_vantage_interval(interval)),
                ("outputsize", "full"),
                ("extended_hours", "true"),
                ("adjusted", "true"),
                ("datatype", "json"),
                ("month", &month.as_vendor_str()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Transport(format!("json decode failed: {e}")))?;

        if let Some(msg) = body.get("Error Message").and_then(|v| v.as_str()) {
            return Err(FetchError::Vendor(msg.to_string()));
        }
        if let Some(note) = body.get("Note").and_then(|v| v.as_str()) {
            let lower = note.to_ascii_lowercase();
            if lower.contains("limit") || lower.contains("exceeded") {
                return Err(FetchError::RateLimited(note.to_string()));
            }
            return Err(FetchError::Vendor(note.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!("http status {}", status.as_u16())));
        }

        let series_key = format!("Time Series ({})", alpha_vantage_interval(interval));
        let series = body
            .get(&series_key)
            .and_then(|v| v.as_object())
            .ok_or_else(|| FetchError::Vendor(format!("missing '{series_key}' in response")))?;

        let mut out = Vec::with_capacity(series.len());
        for (datetime, row) in series {
            let row: AlphaVantageRow = serde_json::from_value(row.clone())
                .map_err(|e| FetchError::Malformed(format!("row at {datetime}: {e}")))?;
            let naive = NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| FetchError::Malformed(format!("datetime '{datetime}': {e}")))?;
            let timestamp = Utc.from_utc_datetime(&naive).timestamp();
            let volume = row.volume.unwrap_or_else(|| "0".to_string()).parse::<i64>().unwrap_or(0);
            out.push(ProviderBar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AlphaVantageRow {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

/// Canned-response provider used by tests in place of live HTTP.
pub struct MockProvider {
    by_month: HashMap<YearMonth, Vec<ProviderBar>>,
    error: Option<FetchError>,
    default_bars: Vec<ProviderBar>,
}

impl MockProvider {
    pub fn with_bars(bars: Vec<ProviderBar>) -> MockProvider {
        MockProvider { by_month: HashMap::new(), error: None, default_bars: bars }
    }

    pub fn with_bars_per_month(months: Vec<(YearMonth, Vec<ProviderBar>)>) -> MockProvider {
        MockProvider { by_month: months.into_iter().collect(), error: None, default_bars: Vec::new() }
    }

    pub fn with_error(error: FetchError) -> MockProvider {
        MockProvider { by_month: HashMap::new(), error: Some(error), default_bars: Vec::new() }
    }
}

#[async_trait]
impl HistoricalProvider for MockProvider {
    fn source_name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_month_raw(
        &self,
        _symbol: &str,
        _interval: Interval,
        month: YearMonth,
    ) -> Result<Vec<ProviderBar>, FetchError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if let Some(bars) = self.by_month.get(&month) {
            return Ok(bars.clone());
        }
        Ok(self.default_bars.clone())
    }
}
