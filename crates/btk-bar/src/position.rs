//! Open exposure in a single symbol.

use serde::{Deserialize, Serialize};

use crate::micros::Micros;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// At most one `Position` exists per symbol in a `Portfolio`. Created on the
/// first fill that opens exposure from flat; closed (removed) when net
/// quantity returns to zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: i64,
    pub entry_price: Micros,
    pub entry_time: i64,
    pub current_price: Micros,
    pub unrealized_pl: Micros,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: i64,
        entry_price: Micros,
        entry_time: i64,
    ) -> Position {
        debug_assert!(quantity > 0);
        Position {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            entry_time,
            current_price: entry_price,
            unrealized_pl: Micros::ZERO,
        }
    }

    /// Mark to the current bar's price, recomputing `unrealized_pl`.
    pub fn mark_to_market(&mut self, price: Micros) {
        self.current_price = price;
        let diff = price.raw() - self.entry_price.raw();
        let signed_diff = match self.side {
            PositionSide::Long => diff,
            PositionSide::Short => -diff,
        };
        self.unrealized_pl = Micros::new(signed_diff)
            .checked_mul_qty(self.quantity)
            .unwrap_or(Micros::MAX);
    }

    /// Equity contribution of this position: a long position is worth what
    /// it would sell for; a short position is a liability to buy back,
    /// so it subtracts from equity even though `quantity` is always positive.
    pub fn market_value(&self) -> Micros {
        let raw = self.current_price.checked_mul_qty(self.quantity).unwrap_or(Micros::MAX);
        match self.side {
            PositionSide::Long => raw,
            PositionSide::Short => -raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(v: i64) -> Micros {
        Micros::new(v * Micros::SCALE)
    }

    #[test]
    fn long_position_gains_on_price_increase() {
        let mut p = Position::open("AAPL", PositionSide::Long, 10, m(100), 0);
        p.mark_to_market(m(105));
        assert_eq!(p.unrealized_pl, m(50));
    }

    #[test]
    fn short_position_gains_on_price_decrease() {
        let mut p = Position::open("AAPL", PositionSide::Short, 10, m(100), 0);
        p.mark_to_market(m(95));
        assert_eq!(p.unrealized_pl, m(50));
    }

    #[test]
    fn short_market_value_is_a_negative_liability() {
        let mut p = Position::open("AAPL", PositionSide::Short, 10, m(100), 0);
        p.mark_to_market(m(95));
        assert_eq!(p.market_value(), m(-950));
    }

    #[test]
    fn long_market_value_is_a_positive_asset() {
        let mut p = Position::open("AAPL", PositionSide::Long, 10, m(100), 0);
        p.mark_to_market(m(95));
        assert_eq!(p.market_value(), m(950));
    }
}
