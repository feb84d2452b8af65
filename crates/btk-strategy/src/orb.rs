//! Opening-Range Breakout: builds a price range over the first minutes of
//! the session, then looks for a volume-confirmed breakout of that range.

use btk_bar::{Micros, Signal, SignalStrength, SignalType};
use btk_indicators::{atr, sma};

use crate::types::{IndicatorSpec, Strategy, StrategyCategory, StrategyContext, StrategyError, StrategyState};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OrbParams {
    pub range_period_minutes: u32,
    pub breakout_threshold: f64,
    pub volume_multiplier: f64,
    pub stop_loss_atr_multiplier: f64,
    pub take_profit_ratio: f64,
    pub max_position_time_minutes: u32,
    pub min_range_size: f64,
    pub exit_before_close_minutes: u32,
}

impl Default for OrbParams {
    fn default() -> OrbParams {
        OrbParams {
            range_period_minutes: 30,
            breakout_threshold: 0.001,
            volume_multiplier: 1.5,
            stop_loss_atr_multiplier: 1.5,
            take_profit_ratio: 2.0,
            max_position_time_minutes: 240,
            min_range_size: 0.003,
            exit_before_close_minutes: 15,
        }
    }
}

impl OrbParams {
    /// Accumulates every out-of-bracket field instead of stopping at the
    /// first one found.
    pub fn validate(&self) -> Result<(), Vec<StrategyError>> {
        let mut errors = Vec::new();
        let mut check = |field: &str, ok: bool, reason: &str| {
            if !ok {
                errors.push(StrategyError { field: field.to_string(), reason: reason.to_string() });
            }
        };
        check(
            "range_period_minutes",
            (5..=120).contains(&self.range_period_minutes),
            "must be between 5 and 120",
        );
        check(
            "breakout_threshold",
            (0.0..=0.05).contains(&self.breakout_threshold),
            "must be between 0 and 0.05",
        );
        check(
            "volume_multiplier",
            (1.0..=5.0).contains(&self.volume_multiplier),
            "must be between 1.0 and 5.0",
        );
        check(
            "stop_loss_atr_multiplier",
            (0.5..=5.0).contains(&self.stop_loss_atr_multiplier),
            "must be between 0.5 and 5.0",
        );
        check(
            "take_profit_ratio",
            (1.0..=5.0).contains(&self.take_profit_ratio),
            "must be between 1.0 and 5.0",
        );
        check(
            "max_position_time_minutes",
            (30..=480).contains(&self.max_position_time_minutes),
            "must be between 30 and 480",
        );
        check(
            "min_range_size",
            (0.001..=0.02).contains(&self.min_range_size),
            "must be between 0.001 and 0.02",
        );
        check(
            "exit_before_close_minutes",
            (5..=60).contains(&self.exit_before_close_minutes),
            "must be between 5 and 60",
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Init,
    BuildingRange,
    Armed,
    Idle,
    LongOpen,
    ShortOpen,
}

#[derive(Clone, Debug)]
pub struct OrbStrategy {
    params: OrbParams,
    phase: Phase,
    session_start_ts: Option<i64>,
    range_high: Micros,
    range_low: Micros,
    position_opened_ts: Option<i64>,
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    volumes: Vec<f64>,
}

impl OrbStrategy {
    pub fn new(params: OrbParams) -> OrbStrategy {
        OrbStrategy {
            params,
            phase: Phase::Init,
            session_start_ts: None,
            range_high: Micros::ZERO,
            range_low: Micros::ZERO,
            position_opened_ts: None,
            closes: Vec::new(),
            highs: Vec::new(),
            lows: Vec::new(),
            volumes: Vec::new(),
        }
    }

    fn push_bar(&mut self, ctx: &StrategyContext) {
        self.closes.push(ctx.current_bar.close.to_f64());
        self.highs.push(ctx.current_bar.high.to_f64());
        self.lows.push(ctx.current_bar.low.to_f64());
        self.volumes.push(ctx.current_bar.volume as f64);
    }

    /// SMA-20 of volume once that much history exists; a plain mean of
    /// whatever's accumulated so far during the warm-up period.
    fn avg_volume(&self) -> f64 {
        let series = sma(&self.volumes, 20);
        match series.last().copied().filter(|v| !v.is_nan()) {
            Some(v) => v,
            None if self.volumes.is_empty() => f64::INFINITY,
            None => self.volumes.iter().sum::<f64>() / self.volumes.len() as f64,
        }
    }

    fn current_atr(&self) -> f64 {
        let series = atr(&self.highs, &self.lows, &self.closes, 14);
        series.last().copied().filter(|v| !v.is_nan()).unwrap_or(0.0)
    }

    fn range_size_ratio(&self) -> f64 {
        let mid = (self.range_high.to_f64() + self.range_low.to_f64()) / 2.0;
        if mid <= 0.0 {
            return 0.0;
        }
        (self.range_high.to_f64() - self.range_low.to_f64()) / mid
    }

    fn minutes_elapsed_in_session(&self, ts: i64) -> i64 {
        match self.session_start_ts {
            Some(start) => (ts - start) / 60,
            None => 0,
        }
    }

    fn is_new_session(&self, ctx: &StrategyContext) -> bool {
        ctx.is_first_bar_of_session
    }

    fn reset_for_session(&mut self, ctx: &StrategyContext) {
        self.phase = Phase::Init;
        self.session_start_ts = Some(ctx.current_bar.timestamp);
        self.range_high = ctx.current_bar.high;
        self.range_low = ctx.current_bar.low;
        self.closes.clear();
        self.highs.clear();
        self.lows.clear();
        self.volumes.clear();
    }

    fn entry_signal(&self, signal_type: SignalType, ctx: &StrategyContext) -> Signal {
        let entry = ctx.current_bar.close;
        let atr_value = self.current_atr();
        let stop_distance = Micros::from_f64(atr_value * self.params.stop_loss_atr_multiplier).unwrap_or(Micros::ZERO);
        let (stop, target) = match signal_type {
            SignalType::Buy => {
                let stop = entry.saturating_sub(stop_distance);
                let risk = entry.saturating_sub(stop);
                let target = entry.saturating_add(Micros::from_f64(risk.to_f64() * self.params.take_profit_ratio).unwrap_or(Micros::ZERO));
                (stop, target)
            }
            _ => {
                let stop = entry.saturating_add(stop_distance);
                let risk = stop.saturating_sub(entry);
                let target = entry.saturating_sub(Micros::from_f64(risk.to_f64() * self.params.take_profit_ratio).unwrap_or(Micros::ZERO));
                (stop, target)
            }
        };
        Signal::entry(signal_type, SignalStrength::Strong, entry, stop, target, 0.8, "opening range breakout", ctx.current_bar.timestamp)
    }
}

impl Strategy for OrbStrategy {
    fn name(&self) -> &str {
        "opening_range_breakout"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::DayTrading
    }

    fn required_history(&self) -> usize {
        20
    }

    fn on_bar(&mut self, ctx: &StrategyContext, state: &mut StrategyState) -> Signal {
        if self.is_new_session(ctx) {
            self.reset_for_session(ctx);
        }
        self.push_bar(ctx);

        match self.phase {
            Phase::Init => {
                self.phase = Phase::BuildingRange;
                self.range_high = ctx.current_bar.high;
                self.range_low = ctx.current_bar.low;
                Signal::hold(ctx.current_bar.timestamp)
            }
            Phase::BuildingRange => {
                self.range_high = Micros::new(self.range_high.raw().max(ctx.current_bar.high.raw()));
                self.range_low = Micros::new(self.range_low.raw().min(ctx.current_bar.low.raw()));
                let elapsed = self.minutes_elapsed_in_session(ctx.current_bar.timestamp);
                if elapsed >= self.params.range_period_minutes as i64 {
                    self.phase = if self.range_size_ratio() >= self.params.min_range_size {
                        Phase::Armed
                    } else {
                        Phase::Idle
                    };
                }
                Signal::hold(ctx.current_bar.timestamp)
            }
            Phase::Idle => Signal::hold(ctx.current_bar.timestamp),
            Phase::Armed => {
                let close = ctx.current_bar.close.to_f64();
                let volume = ctx.current_bar.volume as f64;
                let vol_ok = volume >= self.avg_volume() * self.params.volume_multiplier;
                let breakout_high = self.range_high.to_f64() * (1.0 + self.params.breakout_threshold);
                let breakout_low = self.range_low.to_f64() * (1.0 - self.params.breakout_threshold);

                if vol_ok && close > breakout_high {
                    self.phase = Phase::LongOpen;
                    self.position_opened_ts = Some(ctx.current_bar.timestamp);
                    self.entry_signal(SignalType::Buy, ctx)
                } else if vol_ok && close < breakout_low {
                    self.phase = Phase::ShortOpen;
                    self.position_opened_ts = Some(ctx.current_bar.timestamp);
                    self.entry_signal(SignalType::Sell, ctx)
                } else {
                    Signal::hold(ctx.current_bar.timestamp)
                }
            }
            Phase::LongOpen | Phase::ShortOpen => {
                if let Some(exit) = self.should_exit(ctx, state) {
                    self.phase = Phase::Idle;
                    self.position_opened_ts = None;
                    exit
                } else {
                    Signal::hold(ctx.current_bar.timestamp)
                }
            }
        }
    }

    fn should_exit(&self, ctx: &StrategyContext, state: &StrategyState) -> Option<Signal> {
        if let Some(minutes) = ctx.minutes_to_close {
            if minutes <= self.params.exit_before_close_minutes as i64 {
                return Some(Signal::close("exit before close", ctx.current_bar.timestamp));
            }
        }
        if let Some(opened_ts) = self.position_opened_ts {
            let age_minutes = (ctx.current_bar.timestamp - opened_ts) / 60;
            if age_minutes >= self.params.max_position_time_minutes as i64 {
                return Some(Signal::close("max position time reached", ctx.current_bar.timestamp));
            }
        }
        // Defer to the trait default for price-based stop/take checks.
        default_should_exit(ctx, state)
    }

    fn validate_parameters(&self) -> Result<(), Vec<StrategyError>> {
        self.params.validate()
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        vec![IndicatorSpec { name: "sma_volume", period: 20 }, IndicatorSpec { name: "atr", period: 14 }]
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

/// Price-based stop/take check shared with the default trait behavior;
/// broken out as a free function so `should_exit` can layer the
/// time-based exits above it without calling through a trait default from
/// inside its own override.
fn default_should_exit(ctx: &StrategyContext, state: &StrategyState) -> Option<Signal> {
    let pos = state.current_position.as_ref()?;
    let entry = pos.entry_price.to_f64();
    let current = pos.current_price.to_f64();
    let change = match pos.side {
        btk_bar::PositionSide::Long => (current - entry) / entry,
        btk_bar::PositionSide::Short => (entry - current) / entry,
    };
    if change <= -0.02 {
        Some(Signal::close("stop loss", ctx.current_bar.timestamp))
    } else if change >= 0.04 {
        Some(Signal::close("take profit", ctx.current_bar.timestamp))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btk_bar::{Bar, Interval, Position, PositionSide};
    use std::collections::BTreeMap;

    fn bar(ts: i64, high: f64, low: f64, close: f64, volume: i64) -> Bar {
        Bar::new(
            "AAPL",
            Interval::M1,
            ts,
            Micros::from_f64(close).unwrap(),
            Micros::from_f64(high).unwrap(),
            Micros::from_f64(low).unwrap(),
            Micros::from_f64(close).unwrap(),
            volume,
        )
        .unwrap()
    }

    fn ctx_for(bar: Bar, minutes_to_close: Option<i64>) -> StrategyContext {
        ctx_for_session(bar, minutes_to_close, false)
    }

    fn ctx_for_session(bar: Bar, minutes_to_close: Option<i64>, is_first_bar_of_session: bool) -> StrategyContext {
        StrategyContext {
            current_bar: bar,
            previous_bars: Vec::new(),
            is_market_hours: true,
            is_extended_hours: false,
            is_first_bar_of_session,
            minutes_to_close,
            cash: Micros::from_f64(100_000.0).unwrap(),
            positions: BTreeMap::new(),
            total_value: Micros::from_f64(100_000.0).unwrap(),
            risk_limits: crate::types::RiskLimits { max_position_value: Micros::from_f64(100_000.0).unwrap(), risk_per_trade: 0.01 },
        }
    }

    #[test]
    fn default_params_validate_clean() {
        assert!(OrbParams::default().validate().is_ok());
    }

    #[test]
    fn validate_accumulates_every_offending_field() {
        let params = OrbParams {
            range_period_minutes: 1,
            breakout_threshold: 1.0,
            volume_multiplier: 0.1,
            stop_loss_atr_multiplier: 10.0,
            take_profit_ratio: 10.0,
            max_position_time_minutes: 1,
            min_range_size: 1.0,
            exit_before_close_minutes: 1000,
        };
        let errors = params.validate().unwrap_err();
        assert_eq!(errors.len(), 8);
    }

    #[test]
    fn idle_session_with_tight_range_never_arms() {
        let mut strat = OrbStrategy::new(OrbParams { range_period_minutes: 5, ..Default::default() });
        let mut state = StrategyState::default();
        let base = 1_000_000_i64;
        for i in 0..6 {
            let ts = base + i * 60;
            let b = bar(ts, 100.01, 99.99, 100.0, 1000);
            let ctx = ctx_for_session(b, Some(300), i == 0);
            strat.on_bar(&ctx, &mut state);
        }
        assert_eq!(strat.phase, Phase::Idle);
    }

    #[test]
    fn wide_range_arms_then_breaks_out_long_on_volume_surge() {
        let mut strat = OrbStrategy::new(OrbParams { range_period_minutes: 5, min_range_size: 0.001, volume_multiplier: 1.2, ..Default::default() });
        let mut state = StrategyState::default();
        let base = 1_000_000_i64;
        // Build a wide range across 6 bars (period elapses at bar index 5).
        for i in 0..6 {
            let ts = base + i * 60;
            let b = bar(ts, 105.0, 95.0, 100.0, 1000);
            let ctx = ctx_for_session(b, Some(300), i == 0);
            strat.on_bar(&ctx, &mut state);
        }
        assert_eq!(strat.phase, Phase::Armed);

        let breakout_bar = bar(base + 6 * 60, 110.0, 106.0, 108.0, 5000);
        let ctx = ctx_for(breakout_bar, Some(300));
        let signal = strat.on_bar(&ctx, &mut state);
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(strat.phase, Phase::LongOpen);
    }

    #[test]
    fn should_exit_forces_close_near_session_end() {
        let strat = OrbStrategy::new(OrbParams::default());
        let mut state = StrategyState::default();
        state.current_position = Some(Position::open("AAPL", PositionSide::Long, 10, Micros::from_f64(100.0).unwrap(), 0));
        let b = bar(1_000_000, 101.0, 99.0, 100.5, 1000);
        let ctx = ctx_for(b, Some(10));
        let exit = strat.should_exit(&ctx, &state);
        assert!(exit.is_some());
    }

    #[test]
    fn should_exit_forces_close_after_max_position_time() {
        let mut strat = OrbStrategy::new(OrbParams { max_position_time_minutes: 30, ..Default::default() });
        strat.position_opened_ts = Some(1_000_000);
        let mut state = StrategyState::default();
        state.current_position = Some(Position::open("AAPL", PositionSide::Long, 10, Micros::from_f64(100.0).unwrap(), 0));
        let b = bar(1_000_000 + 31 * 60, 101.0, 100.8, 100.9, 1000);
        let ctx = ctx_for(b, Some(300));
        let exit = strat.should_exit(&ctx, &state);
        assert!(exit.is_some());
    }

    #[test]
    fn new_session_resets_phase_to_building_range() {
        let mut strat = OrbStrategy::new(OrbParams::default());
        let mut state = StrategyState::default();
        let b1 = bar(2_000_000, 101.0, 99.0, 100.0, 1000);
        strat.on_bar(&ctx_for_session(b1, Some(300), true), &mut state);
        assert_eq!(strat.phase, Phase::BuildingRange);

        let b2 = bar(2_000_060, 102.0, 98.0, 101.0, 1000);
        strat.on_bar(&ctx_for_session(b2, Some(300), false), &mut state);
        assert_eq!(strat.phase, Phase::BuildingRange);
    }

    /// A second trading day must get its own opening range: a strategy
    /// that reached `Armed` (or further) by the end of day one has to fall
    /// back to `BuildingRange` on day two's first bar, forward timestamps
    /// notwithstanding — the engine's own session boundary drives the
    /// reset, not a backward jump in `current_bar.timestamp`.
    #[test]
    fn session_rollover_rebuilds_the_range_even_though_time_moves_forward() {
        let mut strat = OrbStrategy::new(OrbParams { range_period_minutes: 5, min_range_size: 0.001, ..Default::default() });
        let mut state = StrategyState::default();
        let day1 = 1_000_000_i64;
        for i in 0..6 {
            let ts = day1 + i * 60;
            let b = bar(ts, 105.0, 95.0, 100.0, 1000);
            strat.on_bar(&ctx_for_session(b, Some(300), i == 0), &mut state);
        }
        assert_eq!(strat.phase, Phase::Armed);

        // Day two starts well after day one, strictly ascending timestamps,
        // but is still the first bar of a new session.
        let day2 = day1 + 24 * 3600;
        let b = bar(day2, 100.5, 99.5, 100.0, 1000);
        strat.on_bar(&ctx_for_session(b, Some(300), true), &mut state);
        assert_eq!(strat.phase, Phase::BuildingRange);
    }
}
