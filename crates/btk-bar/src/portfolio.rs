//! Portfolio state: cash, open positions, and the equity curve.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::micros::Micros;
use crate::position::Position;

/// `cash`, open positions, and the derived `total_value`. Invariant:
/// `cash >= 0` at all times — the replay engine rejects any fill that would
/// violate this rather than letting it through.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Micros,
    /// Deterministic iteration order for reproducible equity computation.
    pub positions: BTreeMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_cash: Micros) -> Portfolio {
        Portfolio {
            cash: initial_cash,
            positions: BTreeMap::new(),
        }
    }

    /// `cash + sum(position market values)`, recomputed fresh every call —
    /// never cached, so it can never drift from its components.
    pub fn total_value(&self) -> Micros {
        let positions_value: i64 = self
            .positions
            .values()
            .map(|p| p.market_value().raw())
            .sum();
        self.cash.saturating_add(Micros::new(positions_value))
    }

    pub fn mark_all(&mut self, prices: &BTreeMap<String, Micros>) {
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(&price) = prices.get(symbol) {
                position.mark_to_market(price);
            }
        }
    }
}

/// `(timestamp, portfolio_value, running_drawdown)`. The series this
/// belongs to is monotonic in timestamp and `running_drawdown` is always
/// computed against the high-water mark seen so far.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub portfolio_value: Micros,
    pub running_drawdown: f64,
}

/// Append one point to `curve`, deriving `running_drawdown` from the
/// high-water mark of all previously appended points (including this one).
pub fn push_equity_point(curve: &mut Vec<EquityPoint>, timestamp: i64, portfolio_value: Micros) {
    let hwm = curve
        .iter()
        .map(|p| p.portfolio_value.raw())
        .chain(std::iter::once(portfolio_value.raw()))
        .max()
        .unwrap_or(portfolio_value.raw());
    let drawdown = if hwm > 0 {
        (hwm - portfolio_value.raw()) as f64 / hwm as f64
    } else {
        0.0
    };
    curve.push(EquityPoint {
        timestamp,
        portfolio_value,
        running_drawdown: drawdown,
    });
}
