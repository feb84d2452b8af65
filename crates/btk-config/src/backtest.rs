//! Maps the generic config JSON produced by [`crate::load_layered_yaml`]
//! into a concrete [`btk_engine::BacktestConfig`].

use anyhow::{Context, Result};
use btk_bar::Micros;
use btk_clock::{HolidayCalendar, MarketHours};
use btk_engine::BacktestConfig;
use serde_json::Value;

/// Recognized top-level config options per the run's external interface:
/// `symbol`, `start`, `end`, `initial_capital`, `commission`, `slippage`,
/// `market_hours.*`, `allow_extended_hours`, `max_position_size`,
/// `risk_per_trade`.
pub fn build_backtest_config(config: &Value) -> Result<BacktestConfig> {
    let symbol = require_str(config, "symbol")?;
    let start = require_i64(config, "start")?;
    let end = require_i64(config, "end")?;
    let initial_capital = require_f64(config, "initial_capital")?;

    let mut cfg = BacktestConfig::new(symbol, start, end, Micros::from_f64(initial_capital).context("initial_capital out of range")?);

    if let Some(v) = config.get("commission").and_then(Value::as_f64) {
        cfg.commission = Micros::from_f64(v).context("commission out of range")?;
    }
    if let Some(v) = config.get("slippage").and_then(Value::as_f64) {
        cfg.slippage = Micros::from_f64(v).context("slippage out of range")?;
    }
    if let Some(v) = config.get("allow_extended_hours").and_then(Value::as_bool) {
        cfg.allow_extended_hours = v;
    }
    if let Some(v) = config.get("max_position_size").and_then(Value::as_i64) {
        cfg.max_position_size = v;
    }
    if let Some(v) = config.get("risk_per_trade").and_then(Value::as_f64) {
        cfg.risk_per_trade = v;
    }
    if let Some(mh) = config.get("market_hours") {
        cfg.market_hours = build_market_hours(mh)?;
    }

    cfg.holidays = HolidayCalendar::us_market_default();
    Ok(cfg)
}

fn build_market_hours(mh: &Value) -> Result<MarketHours> {
    let mut hours = MarketHours::nyse_default();
    if let Some(v) = mh.get("pre_market_start").and_then(Value::as_i64) {
        hours.pre_market_start_secs = v;
    }
    if let Some(v) = mh.get("market_open").and_then(Value::as_i64) {
        hours.market_open_secs = v;
    }
    if let Some(v) = mh.get("market_close").and_then(Value::as_i64) {
        hours.market_close_secs = v;
    }
    if let Some(v) = mh.get("after_hours_end").and_then(Value::as_i64) {
        hours.after_hours_end_secs = v;
    }
    if let Some(v) = mh.get("utc_offset_secs").and_then(Value::as_i64) {
        hours.utc_offset_secs = v;
    }
    Ok(hours)
}

fn require_str(config: &Value, field: &str) -> Result<String> {
    config.get(field).and_then(Value::as_str).map(str::to_string).ok_or_else(|| missing(field))
}

fn require_i64(config: &Value, field: &str) -> Result<i64> {
    config.get(field).and_then(Value::as_i64).ok_or_else(|| missing(field))
}

fn require_f64(config: &Value, field: &str) -> Result<f64> {
    config.get(field).and_then(Value::as_f64).ok_or_else(|| missing(field))
}

fn missing(field: &str) -> anyhow::Error {
    anyhow::anyhow!("missing required config field: {field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_config_from_full_json() {
        let config = json!({
            "symbol": "AAPL",
            "start": 0,
            "end": 86_400,
            "initial_capital": 100_000.0,
            "commission": 1.0,
            "slippage": 0.01,
            "allow_extended_hours": true,
            "max_position_size": 500,
            "risk_per_trade": 0.02,
            "market_hours": { "market_open": 34_200, "market_close": 57_600 },
        });

        let cfg = build_backtest_config(&config).unwrap();
        assert_eq!(cfg.symbol, "AAPL");
        assert_eq!(cfg.initial_capital, Micros::from_f64(100_000.0).unwrap());
        assert!(cfg.allow_extended_hours);
        assert_eq!(cfg.max_position_size, 500);
        assert_eq!(cfg.market_hours.market_open_secs, 34_200);
    }

    #[test]
    fn missing_required_field_errors() {
        let config = json!({"start": 0, "end": 10, "initial_capital": 1000.0});
        assert!(build_backtest_config(&config).is_err());
    }

    #[test]
    fn unspecified_optionals_keep_engine_defaults() {
        let config = json!({"symbol": "AAPL", "start": 0, "end": 10, "initial_capital": 1000.0});
        let cfg = build_backtest_config(&config).unwrap();
        assert_eq!(cfg.commission, Micros::ZERO);
        assert_eq!(cfg.max_position_size, i64::MAX);
    }
}
