//! When a bar's range triggers both legs of a bracket order, the engine
//! resolves the tie in favor of the adverse outcome: the stop fills and the
//! take-profit is cancelled.

use btk_bar::{Bar, BarSeries, Interval, Micros, Side, Signal, SignalStrength, SignalType};
use btk_engine::ReplayEngine;
use btk_strategy::{Strategy, StrategyCategory, StrategyContext, StrategyState};

#[derive(Clone)]
struct BracketOnceStrategy {
    entered: bool,
}

impl Strategy for BracketOnceStrategy {
    fn name(&self) -> &str {
        "bracket_once"
    }
    fn category(&self) -> StrategyCategory {
        StrategyCategory::SwingTrading
    }
    fn required_history(&self) -> usize {
        0
    }
    fn on_bar(&mut self, ctx: &StrategyContext, _state: &mut StrategyState) -> Signal {
        if self.entered {
            return Signal::hold(ctx.current_bar.timestamp);
        }
        self.entered = true;
        Signal {
            quantity: Some(10),
            ..Signal::entry(
                SignalType::Buy,
                SignalStrength::Strong,
                ctx.current_bar.close,
                Micros::from_f64(95.0).unwrap(),
                Micros::from_f64(110.0).unwrap(),
                1.0,
                "enter with bracket",
                ctx.current_bar.timestamp,
            )
        }
    }
    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new("AAPL", Interval::M1, ts, Micros::from_f64(open).unwrap(), Micros::from_f64(high).unwrap(), Micros::from_f64(low).unwrap(), Micros::from_f64(close).unwrap(), 1_000).unwrap()
}

#[test]
fn colliding_bracket_resolves_to_the_stop() {
    let base = 3_000_000;
    // Bar 0: signal generated (entry at 100, stop 95, target 110).
    // Bar 1: entry fills at the open.
    // Bar 2: high and low both breach the bracket in the same bar.
    let bars = BarSeries::from_sorted(vec![
        bar(base, 100.0, 101.0, 99.0, 100.0),
        bar(base + 60, 100.0, 101.0, 99.0, 100.0),
        bar(base + 120, 100.0, 115.0, 90.0, 100.0),
        bar(base + 180, 100.0, 101.0, 99.0, 100.0),
    ])
    .unwrap();

    let config = btk_testkit::always_on_config("AAPL", base, base + 180, 100_000.0);
    let mut engine = ReplayEngine::new(config, Box::new(BracketOnceStrategy { entered: false }));
    let result = engine.run(&bars).unwrap();

    // Entry fill plus exactly one bracket leg filling — never both.
    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[0].side, Side::Buy);
    assert_eq!(result.trades[1].side, Side::Sell);
    assert!(result.trades[1].reason.starts_with("bracket-stop:"));
    assert!(result.trades[1].price <= Micros::from_f64(100.0).unwrap());
}
