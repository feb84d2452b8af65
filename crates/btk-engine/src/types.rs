use std::fmt;

use btk_bar::Micros;
use btk_clock::{HolidayCalendar, MarketHours};

/// Everything a single backtest run needs: the symbol and window to
/// replay, starting capital, friction model, and position-sizing caps
/// handed down to the strategy as `RiskLimits`.
#[derive(Clone, Debug)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start: i64,
    pub end: i64,
    pub initial_capital: Micros,
    /// Flat commission charged per fill.
    pub commission: Micros,
    /// Slippage applied against the fill price, adverse to the trader.
    pub slippage: Micros,
    pub market_hours: MarketHours,
    pub holidays: HolidayCalendar,
    pub allow_extended_hours: bool,
    pub max_position_size: i64,
    pub risk_per_trade: f64,
}

impl BacktestConfig {
    pub fn new(symbol: impl Into<String>, start: i64, end: i64, initial_capital: Micros) -> BacktestConfig {
        BacktestConfig {
            symbol: symbol.into(),
            start,
            end,
            initial_capital,
            commission: Micros::ZERO,
            slippage: Micros::ZERO,
            market_hours: MarketHours::nyse_default(),
            holidays: HolidayCalendar::us_market_default(),
            allow_extended_hours: false,
            max_position_size: i64::MAX,
            risk_per_trade: 0.01,
        }
    }
}

/// Rejections that stop a single fill from being applied. A run that
/// raises `InvariantViolation` indicates a bug in the engine itself
/// (e.g. a fill that would leave cash negative after the insufficient-cash
/// guard already should have caught it) rather than an ordinary market
/// condition, and is never expected in a correctly functioning run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    InsufficientCash { required: i64, available: i64 },
    InvariantViolation(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::InsufficientCash { required, available } => {
                write!(f, "insufficient cash: required {required} micros, available {available} micros")
            }
            ExecutionError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for ExecutionError {}
