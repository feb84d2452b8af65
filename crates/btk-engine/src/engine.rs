//! Replay Engine: drives a single strategy over a bar series, one bar at a
//! time, in ascending timestamp order. Nothing here looks ahead — every
//! order generated while evaluating bar `b` is queued and can only fill
//! against bar `b+1` or later.

use btk_bar::{push_equity_point, BarSeries, EquityPoint, Order, OrderType, Portfolio, Side, TimeInForce, Trade};
use btk_strategy::{Strategy, StrategyContext, StrategyState};
use uuid::Uuid;

use crate::ledger::{apply_fill, LedgerEntry};
use crate::types::{BacktestConfig, ExecutionError};

/// Everything a completed run produced: the filled trade log, the equity
/// curve, the terminal portfolio, and the append-only ledger it was built
/// from.
pub struct ReplayResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_portfolio: Portfolio,
    pub ledger: Vec<LedgerEntry>,
}

pub struct ReplayEngine {
    config: BacktestConfig,
    strategy: Box<dyn Strategy>,
    state: StrategyState,
    portfolio: Portfolio,
    pending: Vec<Order>,
    trades: Vec<Trade>,
    ledger: Vec<LedgerEntry>,
    equity_curve: Vec<EquityPoint>,
}

impl ReplayEngine {
    pub fn new(config: BacktestConfig, strategy: Box<dyn Strategy>) -> ReplayEngine {
        let portfolio = Portfolio::new(config.initial_capital);
        ReplayEngine {
            config,
            strategy,
            state: StrategyState::default(),
            portfolio,
            pending: Vec::new(),
            trades: Vec::new(),
            ledger: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn run(&mut self, bars: &BarSeries) -> Result<ReplayResult, ExecutionError> {
        let series = bars.slice_range(self.config.start, self.config.end);
        let all_bars = series.bars();
        tracing::debug!(symbol = %self.config.symbol, bars = all_bars.len(), strategy = self.strategy.name(), "starting replay");

        for (idx, bar) in all_bars.iter().enumerate() {
            // 1. Mark to market and record the equity curve point.
            if let Some(pos) = self.portfolio.positions.get_mut(&bar.symbol) {
                pos.mark_to_market(bar.close);
            }
            push_equity_point(&mut self.equity_curve, bar.timestamp, self.portfolio.total_value());

            // 2. Session flags.
            let is_market_hours = self.config.market_hours.is_market_hours(bar.timestamp, &self.config.holidays);
            let is_extended_hours = self.config.market_hours.is_extended_hours(bar.timestamp, &self.config.holidays);
            let minutes_to_close = self.config.market_hours.minutes_to_close(bar.timestamp, &self.config.holidays);
            let is_last_bar_of_session = next_bar_starts_new_session(all_bars, idx, &self.config);
            let is_first_bar_of_session = idx == 0 || next_bar_starts_new_session(all_bars, idx - 1, &self.config);

            // 3. Match pending orders against this bar.
            self.match_pending_orders(bar.timestamp, bar.open, bar.high, bar.low, bar.close, is_last_bar_of_session)?;

            self.state.current_position = self.portfolio.positions.get(&bar.symbol).cloned();

            let ctx = StrategyContext {
                current_bar: bar.clone(),
                previous_bars: history_window(all_bars, idx, self.strategy.required_history()),
                is_market_hours,
                is_extended_hours,
                is_first_bar_of_session,
                minutes_to_close,
                cash: self.portfolio.cash,
                positions: self.portfolio.positions.clone(),
                total_value: self.portfolio.total_value(),
                risk_limits: btk_strategy::RiskLimits {
                    max_position_value: self.portfolio.total_value(),
                    risk_per_trade: self.config.risk_per_trade,
                },
            };

            if !is_market_hours && !(is_extended_hours && self.config.allow_extended_hours) {
                continue;
            }

            // 5. Strategy-driven exit (time-based, or whatever the strategy overrides).
            if let Some(exit) = self.strategy.should_exit(&ctx, &self.state) {
                self.queue_close(exit.reason.as_str(), bar.timestamp);
            }

            // 6. Strategy decision for this bar.
            let signal = self.strategy.on_bar(&ctx, &mut self.state);
            self.queue_signal(&ctx, &signal);

            // 7. Session-end close-outs.
            if is_last_bar_of_session {
                for exit in self.strategy.on_session_end(&mut self.state) {
                    self.queue_close(exit.reason.as_str(), bar.timestamp);
                }
            }
        }

        Ok(ReplayResult {
            trades: self.trades.clone(),
            equity_curve: self.equity_curve.clone(),
            final_portfolio: self.portfolio.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn queue_close(&mut self, reason: &str, ts: i64) {
        let Some(pos) = self.state.current_position.clone() else { return };
        self.cancel_bracket_orders_for(&pos.symbol);
        let side = match pos.side {
            btk_bar::PositionSide::Long => Side::Sell,
            btk_bar::PositionSide::Short => Side::Buy,
        };
        let order = Order::new_pending(pos.symbol.clone(), side, OrderType::Market, pos.quantity, None, None, TimeInForce::Day, ts, reason.to_string());
        self.pending.push(order);
    }

    fn queue_signal(&mut self, ctx: &StrategyContext, signal: &btk_bar::Signal) {
        use btk_bar::SignalType;
        let side = match signal.signal_type {
            SignalType::Buy => Side::Buy,
            SignalType::Sell => Side::Sell,
            SignalType::Hold | SignalType::Close => return,
        };

        let qty = signal.quantity.unwrap_or_else(|| self.strategy.calculate_position_size(signal, ctx)).min(self.config.max_position_size).max(1);

        let entry = Order::new_pending(ctx.symbol().to_string(), side, OrderType::Market, qty, None, None, TimeInForce::Day, ctx.current_bar.timestamp, signal.reason.clone());
        self.pending.push(entry);

        if let (Some(stop), Some(target)) = (signal.stop_loss, signal.take_profit) {
            let exit_side = side.opposite();
            let group = Uuid::new_v4();
            let stop_order = Order::new_pending(ctx.symbol().to_string(), exit_side, OrderType::Stop, qty, None, Some(stop), TimeInForce::Gtc, ctx.current_bar.timestamp, format!("bracket-stop:{group}"));
            let target_order = Order::new_pending(ctx.symbol().to_string(), exit_side, OrderType::Limit, qty, Some(target), None, TimeInForce::Gtc, ctx.current_bar.timestamp, format!("bracket-target:{group}"));
            self.pending.push(stop_order);
            self.pending.push(target_order);
        }
    }

    fn cancel_bracket_orders_for(&mut self, symbol: &str) {
        self.pending.retain(|o| !(o.symbol == symbol && (o.reason.starts_with("bracket-stop:") || o.reason.starts_with("bracket-target:"))));
    }

    /// Matches every pending order against one bar's OHLC. Bracket pairs
    /// (a stop-loss and a take-profit sharing a group id) that would both
    /// trigger within the same bar resolve to the stop filling and the
    /// target being cancelled — the adverse outcome wins ties.
    fn match_pending_orders(
        &mut self,
        ts: i64,
        open: btk_bar::Micros,
        high: btk_bar::Micros,
        low: btk_bar::Micros,
        close: btk_bar::Micros,
        session_closing: bool,
    ) -> Result<(), ExecutionError> {
        let _ = close;
        let mut fills = Vec::new();
        let mut cancel_groups: Vec<String> = Vec::new();

        for order in &self.pending {
            if order.status.is_terminal() {
                continue;
            }
            if let Some(fill_price) = evaluate_trigger(order, open, high, low, self.config.slippage) {
                fills.push((order.id, fill_price));
                if let Some(group) = bracket_group(&order.reason) {
                    if order.reason.starts_with("bracket-target:") {
                        cancel_groups.push(group);
                    }
                }
            }
        }

        // Adverse tie-break: if a bracket's stop also triggered this bar,
        // drop the target fill even if it was independently triggerable.
        for order in &self.pending {
            if let Some(group) = bracket_group(&order.reason) {
                if order.reason.starts_with("bracket-stop:") && fills.iter().any(|(id, _)| *id == order.id) {
                    cancel_groups.push(group);
                }
            }
        }
        fills.retain(|(id, _)| {
            let Some(order) = self.pending.iter().find(|o| o.id == *id) else { return false };
            if order.reason.starts_with("bracket-target:") {
                if let Some(group) = bracket_group(&order.reason) {
                    if cancel_groups.contains(&group) {
                        return false;
                    }
                }
            }
            true
        });

        for (id, price) in fills {
            let order = self.pending.iter_mut().find(|o| o.id == id).expect("fill id sourced from pending list");
            let trial = Trade {
                id: Uuid::new_v4(),
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                price,
                timestamp: ts,
                commission: self.config.commission,
                slippage: self.config.slippage,
                reason: order.reason.clone(),
            };
            match apply_fill(&mut self.portfolio, &trial) {
                Ok(()) => {
                    order.fill(ts, price);
                    self.ledger.push(LedgerEntry::Fill(trial.clone()));
                    self.trades.push(trial.clone());
                    let order_snapshot = order.clone();
                    self.strategy.on_fill(&order_snapshot, &mut self.state);
                    if let Some(group) = bracket_group(&order_snapshot.reason) {
                        cancel_groups.push(group);
                    }
                }
                Err(ExecutionError::InsufficientCash { required, available }) => {
                    tracing::warn!(symbol = %order.symbol, required, available, "order rejected, insufficient cash");
                    order.reject("insufficient cash");
                }
                Err(err) => return Err(err),
            }
        }

        for group in &cancel_groups {
            for order in self.pending.iter_mut() {
                if !order.status.is_terminal() && bracket_group(&order.reason).as_deref() == Some(group) {
                    order.cancel();
                }
            }
        }

        if session_closing {
            for order in self.pending.iter_mut() {
                if !order.status.is_terminal() && order.time_in_force == TimeInForce::Day {
                    order.cancel();
                }
            }
        }

        self.pending.retain(|o| !o.status.is_terminal());
        Ok(())
    }
}

fn bracket_group(reason: &str) -> Option<String> {
    reason.split_once(':').map(|(_, id)| id.to_string())
}

fn evaluate_trigger(order: &Order, open: btk_bar::Micros, high: btk_bar::Micros, low: btk_bar::Micros, slippage: btk_bar::Micros) -> Option<btk_bar::Micros> {
    match order.order_type {
        OrderType::Market => Some(match order.side {
            Side::Buy => open.saturating_add(slippage),
            Side::Sell => open.saturating_sub(slippage),
        }),
        OrderType::Limit => {
            let limit = order.price?;
            match order.side {
                Side::Buy if low.raw() <= limit.raw() => Some(if limit.raw() < open.raw() { limit } else { open }),
                Side::Sell if high.raw() >= limit.raw() => Some(if limit.raw() > open.raw() { limit } else { open }),
                _ => None,
            }
        }
        OrderType::Stop => {
            let stop = order.stop_price?;
            match order.side {
                Side::Buy if high.raw() >= stop.raw() => {
                    let base = if stop.raw() > open.raw() { stop } else { open };
                    Some(base.saturating_add(slippage))
                }
                Side::Sell if low.raw() <= stop.raw() => {
                    let base = if stop.raw() < open.raw() { stop } else { open };
                    Some(base.saturating_sub(slippage))
                }
                _ => None,
            }
        }
        OrderType::StopLimit => {
            let stop = order.stop_price?;
            let limit = order.price?;
            match order.side {
                Side::Buy if high.raw() >= stop.raw() && low.raw() <= limit.raw() => Some(limit),
                Side::Sell if low.raw() <= stop.raw() && high.raw() >= limit.raw() => Some(limit),
                _ => None,
            }
        }
    }
}

fn history_window(bars: &[btk_bar::Bar], idx: usize, len: usize) -> Vec<btk_bar::Bar> {
    let start = idx.saturating_sub(len);
    bars[start..idx].to_vec()
}

/// `true` when the bar at `idx` is the last bar of its trading session —
/// i.e. the next bar (if any) falls in a different session, or this is
/// the final bar of the run.
fn next_bar_starts_new_session(bars: &[btk_bar::Bar], idx: usize, config: &BacktestConfig) -> bool {
    match bars.get(idx + 1) {
        None => true,
        Some(next) => {
            let close_before_next = config.market_hours.next_market_close(bars[idx].timestamp, &config.holidays);
            next.timestamp > close_before_next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btk_bar::{Bar, Interval, Micros, Signal, SignalStrength, SignalType as SigType};
    use btk_clock::{HolidayCalendar, MarketHours};
    use btk_strategy::StrategyCategory;

    struct BuyOnceStrategy {
        bought: bool,
    }

    impl Strategy for BuyOnceStrategy {
        fn name(&self) -> &str {
            "buy_once"
        }
        fn category(&self) -> StrategyCategory {
            StrategyCategory::SwingTrading
        }
        fn required_history(&self) -> usize {
            0
        }
        fn on_bar(&mut self, ctx: &StrategyContext, _state: &mut StrategyState) -> Signal {
            if !self.bought {
                self.bought = true;
                Signal {
                    quantity: Some(1),
                    ..Signal::entry(SigType::Buy, SignalStrength::Medium, ctx.current_bar.close, Micros::ZERO, Micros::ZERO, 1.0, "enter", ctx.current_bar.timestamp)
                }
            } else {
                Signal::hold(ctx.current_bar.timestamp)
            }
        }
        fn clone_box(&self) -> Box<dyn Strategy> {
            Box::new(BuyOnceStrategy { bought: self.bought })
        }
    }

    fn bar(ts: i64, price: f64, volume: i64) -> Bar {
        Bar::new("AAPL", Interval::M60, ts, Micros::from_f64(price).unwrap(), Micros::from_f64(price + 1.0).unwrap(), Micros::from_f64(price - 1.0).unwrap(), Micros::from_f64(price).unwrap(), volume).unwrap()
    }

    #[test]
    fn entry_signal_fills_on_the_following_bar_not_the_signal_bar() {
        let mh = MarketHours::always_on();
        let hols = HolidayCalendar::empty();
        let bars = BarSeries::from_sorted(vec![bar(0, 100.0, 100), bar(3600, 101.0, 100), bar(7200, 102.0, 100)]).unwrap();

        let mut config = BacktestConfig::new("AAPL", 0, 7200, Micros::from_f64(100_000.0).unwrap());
        config.market_hours = mh;
        config.holidays = hols;

        let mut engine = ReplayEngine::new(config, Box::new(BuyOnceStrategy { bought: false }));
        let result = engine.run(&bars).unwrap();

        assert_eq!(result.trades.len(), 1);
        // Signal generated while evaluating bar 0 fills using bar 3600's open, not bar 0's.
        assert_eq!(result.trades[0].timestamp, 3600);
    }

    #[test]
    fn equity_curve_has_one_point_per_bar() {
        let mh = MarketHours::always_on();
        let bars = BarSeries::from_sorted(vec![bar(0, 100.0, 100), bar(3600, 101.0, 100)]).unwrap();
        let mut config = BacktestConfig::new("AAPL", 0, 3600, Micros::from_f64(100_000.0).unwrap());
        config.market_hours = mh;
        config.holidays = HolidayCalendar::empty();
        let mut engine = ReplayEngine::new(config, Box::new(BuyOnceStrategy { bought: true }));
        let result = engine.run(&bars).unwrap();
        assert_eq!(result.equity_curve.len(), 2);
    }
}
