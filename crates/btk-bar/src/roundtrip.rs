//! A matched entry+exit pair, the unit the performance analyzer reasons
//! about. Construction (FIFO matching over the trade log) lives in
//! `btk-analyzer`; this crate only owns the resulting shape.

use serde::{Deserialize, Serialize};

use crate::micros::Micros;
use crate::position::PositionSide;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundTrip {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: i64,
    pub entry_price: Micros,
    pub entry_time: i64,
    pub exit_price: Micros,
    pub exit_time: i64,
    pub commissions: Micros,
    pub pnl: Micros,
}

impl RoundTrip {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: i64,
        entry_price: Micros,
        entry_time: i64,
        exit_price: Micros,
        exit_time: i64,
        commissions: Micros,
    ) -> RoundTrip {
        debug_assert!(quantity > 0);
        let diff = exit_price.raw() - entry_price.raw();
        let signed_diff = match side {
            PositionSide::Long => diff,
            PositionSide::Short => -diff,
        };
        let gross = Micros::new(signed_diff).checked_mul_qty(quantity).unwrap_or(Micros::MAX);
        let pnl = gross.saturating_sub(commissions);
        RoundTrip {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            entry_time,
            exit_price,
            exit_time,
            commissions,
            pnl,
        }
    }

    pub fn holding_minutes(&self) -> f64 {
        (self.exit_time - self.entry_time) as f64 / 60.0
    }

    pub fn is_win(&self) -> bool {
        self.pnl.is_positive()
    }
}
