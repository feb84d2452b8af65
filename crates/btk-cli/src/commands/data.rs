//! `btk data fetch`: pulls a symbol/interval range from the external
//! provider into the local cache, gap-filling as it goes.

use anyhow::{Context, Result};
use btk_bar::Interval;
use btk_cache::CacheStore;
use btk_clock::{HolidayCalendar, MarketHours};
use btk_data::DataManager;
use btk_fetcher::{AlphaVantageProvider, RateLimitConfig, TimeSeriesFetcher};

use crate::time::{month_end_epoch, month_start_epoch};

const ENV_API_KEY: &str = "BTK_ALPHAVANTAGE_API_KEY";

pub struct FetchArgs {
    pub symbol: String,
    pub interval: Interval,
    pub start: String,
    pub end: String,
    pub cache_url: String,
}

pub async fn fetch(args: FetchArgs) -> Result<()> {
    let api_key = std::env::var(ENV_API_KEY).with_context(|| format!("missing env var {ENV_API_KEY}"))?;
    let start_ts = month_start_epoch(&args.start)?;
    let end_ts = month_end_epoch(&args.end)?;

    let cache_pool = btk_cache::connect(&args.cache_url).await?;
    btk_cache::migrate(&cache_pool).await?;
    let cache = CacheStore::new(cache_pool);

    let provider = AlphaVantageProvider::new(api_key);
    let fetcher = TimeSeriesFetcher::new(provider, RateLimitConfig::free());
    let mut manager = DataManager::new(cache, fetcher, MarketHours::nyse_default(), HolidayCalendar::us_market_default());

    let series = manager.get_series(&args.symbol, args.interval, start_ts, end_ts, false).await.context("fetch failed")?;

    println!("symbol={} interval={} bars={}", args.symbol, args.interval.as_str(), series.len());
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        println!("range={}..={}", first.timestamp, last.timestamp);
    }

    Ok(())
}
