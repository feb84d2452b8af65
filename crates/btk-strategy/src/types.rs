use std::collections::BTreeMap;
use std::fmt;

use btk_bar::{Bar, Micros, Order, Position, PositionSide, Signal, SignalStrength, SignalType};

/// A strategy's natural holding-period scale. `on_session_end` behavior is
/// keyed off this: day-trading strategies must flatten at session close,
/// the others may carry positions across sessions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrategyCategory {
    DayTrading,
    SwingTrading,
    PositionTrading,
}

/// A field-level parameter validation failure, accumulated rather than
/// raised on the first offender so a caller sees every problem at once.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyError {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for StrategyError {}

/// Names an indicator and the lookback a strategy needs computed for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndicatorSpec {
    pub name: &'static str,
    pub period: usize,
}

/// Account-level limits passed down from the backtest configuration; a
/// strategy's default sizing/exit logic reads these but never mutates them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RiskLimits {
    pub max_position_value: Micros,
    pub risk_per_trade: f64,
}

/// Everything a strategy needs to make one `on_bar` decision: the bar under
/// evaluation, bounded recent history, session-timing flags, and a
/// read-only snapshot of account state.
#[derive(Clone, Debug)]
pub struct StrategyContext {
    pub current_bar: Bar,
    /// Most recent bars before `current_bar`, oldest first, truncated to
    /// the strategy's `required_history()`.
    pub previous_bars: Vec<Bar>,
    pub is_market_hours: bool,
    pub is_extended_hours: bool,
    /// `true` for the first bar the engine evaluates in a new trading
    /// session (including the very first bar of the run) — the signal a
    /// session-scoped strategy (e.g. opening-range breakout) should key its
    /// per-session reset off, rather than guessing from bar timestamps.
    pub is_first_bar_of_session: bool,
    pub minutes_to_close: Option<i64>,
    pub cash: Micros,
    pub positions: BTreeMap<String, Position>,
    pub total_value: Micros,
    pub risk_limits: RiskLimits,
}

impl StrategyContext {
    pub fn position_for(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn symbol(&self) -> &str {
        &self.current_bar.symbol
    }
}

/// Bookkeeping the replay engine maintains on a strategy's behalf across
/// bars: the open position (if any), still-pending orders, the last signal
/// emitted, a free-form session scratchpad, a cached indicator snapshot,
/// and running counters. The strategy reads and writes this by `&mut`
/// reference on every call; nothing here is reset except by the engine at
/// session boundaries.
#[derive(Clone, Debug, Default)]
pub struct StrategyState {
    pub current_position: Option<Position>,
    pub pending_orders: Vec<Order>,
    pub last_signal: Option<Signal>,
    pub scratch: BTreeMap<String, String>,
    pub indicator_cache: BTreeMap<String, f64>,
    pub trades_count: u64,
    pub bars_in_position: i64,
}

/// A strategy is a pluggable decision function over bars. Implementations
/// carry their own private fields for internal state machines (e.g. a
/// session phase); `StrategyState` is the slice of that state the engine
/// needs visibility into for bookkeeping.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn category(&self) -> StrategyCategory;
    fn required_history(&self) -> usize;

    /// Called once per bar, in ascending timestamp order.
    fn on_bar(&mut self, ctx: &StrategyContext, state: &mut StrategyState) -> Signal;

    /// Notification only — the order has already been filled by the time
    /// this runs. No return value because there is nothing left to decide.
    fn on_fill(&mut self, _order: &Order, _state: &mut StrategyState) {}

    /// For day-trading strategies, must emit `CLOSE` for any open position.
    fn on_session_end(&mut self, state: &mut StrategyState) -> Vec<Signal> {
        match (&state.current_position, self.category()) {
            (Some(_), StrategyCategory::DayTrading) => {
                vec![Signal::close("session end flatten", state.current_position.as_ref().unwrap().entry_time)]
            }
            _ => Vec::new(),
        }
    }

    /// Default sizing: the smaller of a cash-based cap (10% of available
    /// cash, 25% of total portfolio value) and, when a stop loss is given,
    /// a risk-based cap (1% of account value per share at risk). Never
    /// less than one share.
    fn calculate_position_size(&self, signal: &Signal, ctx: &StrategyContext) -> i64 {
        let price = signal.price.map(Micros::to_f64).unwrap_or(0.0).max(0.000_001);
        let cash_cap_by_cash = ctx.cash.to_f64() * 0.10;
        let cash_cap_by_total = ctx.total_value.to_f64() * 0.25;
        let cash_cap = cash_cap_by_cash.min(cash_cap_by_total);
        let cash_based_qty = (cash_cap / price).floor() as i64;

        let qty = match signal.stop_loss {
            Some(stop) => {
                let risk_per_share = (price - stop.to_f64()).abs().max(0.000_001);
                let risk_budget = ctx.total_value.to_f64() * 0.01;
                let risk_based_qty = (risk_budget / risk_per_share).floor() as i64;
                cash_based_qty.min(risk_based_qty)
            }
            None => cash_based_qty,
        };

        qty.max(1)
    }

    /// Default exit policy: stop-loss at 2% and take-profit at 4% of entry
    /// price. Strategies with their own exit logic (e.g. ATR-based stops)
    /// override this.
    fn should_exit(&self, ctx: &StrategyContext, state: &StrategyState) -> Option<Signal> {
        let pos = state.current_position.as_ref()?;
        let entry = pos.entry_price.to_f64();
        let current = pos.current_price.to_f64();
        let change = match pos.side {
            PositionSide::Long => (current - entry) / entry,
            PositionSide::Short => (entry - current) / entry,
        };
        if change <= -0.02 {
            Some(Signal::close("stop loss", ctx.current_bar.timestamp))
        } else if change >= 0.04 {
            Some(Signal::close("take profit", ctx.current_bar.timestamp))
        } else {
            None
        }
    }

    fn validate_parameters(&self) -> Result<(), Vec<StrategyError>> {
        Ok(())
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        Vec::new()
    }

    /// Strategies must support deep clone so a parameter sweep can hand
    /// each run its own independent, unshared instance.
    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Box<dyn Strategy> {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar(timestamp: i64) -> Bar {
        Bar::new(
            "X",
            btk_bar::Interval::M5,
            timestamp,
            Micros::new(1),
            Micros::new(1),
            Micros::new(1),
            Micros::new(1),
            0,
        )
        .unwrap()
    }

    fn ctx_with(cash: f64, total: f64) -> StrategyContext {
        StrategyContext {
            current_bar: sample_bar(0),
            previous_bars: Vec::new(),
            is_market_hours: true,
            is_extended_hours: false,
            is_first_bar_of_session: false,
            minutes_to_close: Some(100),
            cash: Micros::from_f64(cash).unwrap(),
            positions: BTreeMap::new(),
            total_value: Micros::from_f64(total).unwrap(),
            risk_limits: RiskLimits { max_position_value: Micros::from_f64(total).unwrap(), risk_per_trade: 0.01 },
        }
    }

    struct NoopStrategy;
    impl Strategy for NoopStrategy {
        fn name(&self) -> &str {
            "noop"
        }
        fn category(&self) -> StrategyCategory {
            StrategyCategory::SwingTrading
        }
        fn required_history(&self) -> usize {
            0
        }
        fn on_bar(&mut self, ctx: &StrategyContext, _state: &mut StrategyState) -> Signal {
            Signal::hold(ctx.current_bar.timestamp)
        }
        fn clone_box(&self) -> Box<dyn Strategy> {
            Box::new(NoopStrategy)
        }
    }

    #[test]
    fn default_sizing_uses_cash_cap_when_no_stop_given() {
        let strat = NoopStrategy;
        let ctx = ctx_with(10_000.0, 50_000.0);
        let signal = Signal::entry(
            SignalType::Buy,
            SignalStrength::Medium,
            Micros::from_f64(100.0).unwrap(),
            Micros::from_f64(90.0).unwrap(),
            Micros::from_f64(120.0).unwrap(),
            1.0,
            "test",
            ctx.current_bar.timestamp,
        );
        let signal = Signal { stop_loss: None, ..signal };
        let qty = strat.calculate_position_size(&signal, &ctx);
        // min(10% of 10_000, 25% of 50_000) / 100 = min(1000, 12500) / 100 = 10
        assert_eq!(qty, 10);
    }

    #[test]
    fn default_sizing_is_never_below_one_share() {
        let strat = NoopStrategy;
        let ctx = ctx_with(1.0, 1.0);
        let signal = Signal::entry(
            SignalType::Buy,
            SignalStrength::Medium,
            Micros::from_f64(1_000_000.0).unwrap(),
            Micros::from_f64(900_000.0).unwrap(),
            Micros::from_f64(1_200_000.0).unwrap(),
            1.0,
            "test",
            ctx.current_bar.timestamp,
        );
        let qty = strat.calculate_position_size(&signal, &ctx);
        assert_eq!(qty, 1);
    }

    #[test]
    fn default_should_exit_triggers_stop_loss_at_two_percent() {
        let strat = NoopStrategy;
        let mut ctx = ctx_with(10_000.0, 50_000.0);
        ctx.current_bar.close = Micros::from_f64(98.0).unwrap();
        let mut state = StrategyState::default();
        let mut pos = Position::open("X", PositionSide::Long, 10, Micros::from_f64(100.0).unwrap(), 0);
        pos.mark_to_market(Micros::from_f64(98.0).unwrap());
        state.current_position = Some(pos);
        let exit = strat.should_exit(&ctx, &state);
        assert!(exit.is_some());
        assert_eq!(exit.unwrap().signal_type, SignalType::Close);
    }

    #[test]
    fn default_should_exit_is_none_within_bands() {
        let strat = NoopStrategy;
        let ctx = ctx_with(10_000.0, 50_000.0);
        let mut state = StrategyState::default();
        let mut pos = Position::open("X", PositionSide::Long, 10, Micros::from_f64(100.0).unwrap(), 0);
        pos.mark_to_market(Micros::from_f64(101.0).unwrap());
        state.current_position = Some(pos);
        assert!(strat.should_exit(&ctx, &state).is_none());
    }
}
