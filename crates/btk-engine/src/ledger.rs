//! Append-only fill ledger. Every fill is recorded as a `LedgerEntry`
//! before it is folded into the portfolio, so a run can be reconstructed
//! from its ledger alone, independent of the live `Portfolio` state.

use std::collections::BTreeMap;

use btk_bar::{Micros, Portfolio, Position, PositionSide, Side, Trade};

use crate::types::ExecutionError;

#[derive(Clone, Debug)]
pub enum LedgerEntry {
    Fill(Trade),
}

fn mul_qty_price(qty: i64, price: Micros) -> i128 {
    (qty as i128) * (price.raw() as i128)
}

fn clamp_i128(x: i128) -> i64 {
    x.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn signed_quantity(pos: &Position) -> i64 {
    match pos.side {
        PositionSide::Long => pos.quantity,
        PositionSide::Short => -pos.quantity,
    }
}

/// Apply one trade to the portfolio: debit/credit cash (including
/// commission), then update the symbol's single aggregate position —
/// weighted-averaging the entry price when adding to an existing
/// position, reducing it when a trade partially offsets it, and
/// replacing it outright when a trade crosses through flat to the
/// opposite side. Rejects rather than allows cash to go negative.
pub fn apply_fill(portfolio: &mut Portfolio, trade: &Trade) -> Result<(), ExecutionError> {
    let notional = clamp_i128(mul_qty_price(trade.quantity, trade.price));
    let total_cost = match trade.side {
        Side::Buy => notional.saturating_add(trade.commission.raw()),
        Side::Sell => trade.commission.raw().saturating_sub(notional),
    };

    let new_cash = portfolio.cash.raw().saturating_sub(total_cost);
    if new_cash < 0 {
        return Err(ExecutionError::InsufficientCash { required: total_cost, available: portfolio.cash.raw() });
    }
    portfolio.cash = Micros::new(new_cash);

    apply_position_delta(&mut portfolio.positions, trade);
    Ok(())
}

fn apply_position_delta(positions: &mut BTreeMap<String, Position>, trade: &Trade) {
    let delta = match trade.side {
        Side::Buy => trade.quantity,
        Side::Sell => -trade.quantity,
    };
    if delta == 0 {
        return;
    }

    match positions.get(&trade.symbol) {
        None => {
            let side = if delta > 0 { PositionSide::Long } else { PositionSide::Short };
            positions.insert(trade.symbol.clone(), Position::open(trade.symbol.clone(), side, delta.abs(), trade.price, trade.timestamp));
        }
        Some(existing) => {
            let existing_signed = signed_quantity(existing);
            let new_signed = existing_signed + delta;
            let adding = delta.signum() == existing_signed.signum();

            if new_signed == 0 {
                positions.remove(&trade.symbol);
            } else if adding {
                let total_qty = existing.quantity + trade.quantity;
                let weighted = (mul_qty_price(existing.quantity, existing.entry_price) + mul_qty_price(trade.quantity, trade.price)) / total_qty as i128;
                let mut updated = Position::open(trade.symbol.clone(), existing.side, total_qty, Micros::new(clamp_i128(weighted)), existing.entry_time);
                updated.mark_to_market(trade.price);
                positions.insert(trade.symbol.clone(), updated);
            } else if new_signed.signum() == existing_signed.signum() {
                let mut reduced = Position::open(trade.symbol.clone(), existing.side, new_signed.abs(), existing.entry_price, existing.entry_time);
                reduced.mark_to_market(trade.price);
                positions.insert(trade.symbol.clone(), reduced);
            } else {
                let flipped_side = if new_signed > 0 { PositionSide::Long } else { PositionSide::Short };
                let mut flipped = Position::open(trade.symbol.clone(), flipped_side, new_signed.abs(), trade.price, trade.timestamp);
                flipped.mark_to_market(trade.price);
                positions.insert(trade.symbol.clone(), flipped);
            }
        }
    }
}

/// Rebuilds a portfolio from scratch by replaying every ledger entry in
/// order. Used to verify that incremental application and full replay
/// agree — the same determinism guarantee the ledger exists to provide.
pub fn recompute_from_ledger(initial_cash: Micros, ledger: &[LedgerEntry]) -> Result<Portfolio, ExecutionError> {
    let mut portfolio = Portfolio::new(initial_cash);
    for entry in ledger {
        match entry {
            LedgerEntry::Fill(trade) => apply_fill(&mut portfolio, trade)?,
        }
    }
    Ok(portfolio)
}
