//! FIFO round-trip construction: turns a chronological trade log into
//! matched entry+exit pairs. A buy closes out any short lots oldest first;
//! a sell closes out any long lots oldest first. Whatever of a trade's
//! quantity is left over after closing opens (or extends) a new lot on the
//! book, so a fill can both close part of a position and open the rest
//! fresh in the same trade.

use std::collections::{BTreeMap, VecDeque};

use btk_bar::{Micros, PositionSide, RoundTrip, Side, Trade};

struct Lot {
    side: PositionSide,
    qty: i64,
    price: Micros,
    time: i64,
    /// Truncating integer division of the opening trade's commission by its
    /// quantity. A multi-lot-spanning close therefore allocates commission
    /// slightly unevenly across the lots it touches; this mirrors the
    /// source ledger's own per-unit commission bookkeeping rather than
    /// introducing fractional-micros rounding of its own.
    commission_per_unit: i64,
}

/// Builds the complete round-trip history for a trade log. Trades must
/// already be in chronological order (the order a replay produces them in).
pub fn build_round_trips(trades: &[Trade]) -> Vec<RoundTrip> {
    let mut books: BTreeMap<String, VecDeque<Lot>> = BTreeMap::new();
    let mut round_trips = Vec::new();

    for trade in trades {
        let book = books.entry(trade.symbol.clone()).or_default();
        let commission_per_unit = if trade.quantity > 0 { trade.commission.raw() / trade.quantity } else { 0 };
        let closable_side = match trade.side {
            Side::Buy => PositionSide::Short,
            Side::Sell => PositionSide::Long,
        };

        let mut remaining = trade.quantity;
        while remaining > 0 {
            let Some(lot) = book.front_mut() else { break };
            if lot.side != closable_side {
                break;
            }

            let matched = lot.qty.min(remaining);
            let commissions = Micros::new(
                lot.commission_per_unit.saturating_mul(matched).saturating_add(commission_per_unit.saturating_mul(matched)),
            );
            let (entry_price, entry_time, exit_price, exit_time) = (lot.price, lot.time, trade.price, trade.timestamp);
            round_trips.push(RoundTrip::new(trade.symbol.clone(), lot.side, matched, entry_price, entry_time, exit_price, exit_time, commissions));

            lot.qty -= matched;
            remaining -= matched;
            if lot.qty == 0 {
                book.pop_front();
            }
        }

        if remaining > 0 {
            let side = match trade.side {
                Side::Buy => PositionSide::Long,
                Side::Sell => PositionSide::Short,
            };
            book.push_back(Lot { side, qty: remaining, price: trade.price, time: trade.timestamp, commission_per_unit });
        }
    }

    round_trips
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn trade(side: Side, qty: i64, price: f64, ts: i64, commission: f64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            side,
            quantity: qty,
            price: Micros::from_f64(price).unwrap(),
            timestamp: ts,
            commission: Micros::from_f64(commission).unwrap(),
            slippage: Micros::ZERO,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn simple_buy_then_sell_produces_one_round_trip() {
        let trades = vec![trade(Side::Buy, 10, 100.0, 0, 1.0), trade(Side::Sell, 10, 110.0, 60, 1.0)];
        let rts = build_round_trips(&trades);
        assert_eq!(rts.len(), 1);
        assert_eq!(rts[0].side, PositionSide::Long);
        assert_eq!(rts[0].quantity, 10);
        assert!(rts[0].is_win());
    }

    #[test]
    fn partial_sell_splits_the_lot_across_two_round_trips() {
        let trades = vec![trade(Side::Buy, 10, 100.0, 0, 0.0), trade(Side::Sell, 4, 110.0, 60, 0.0), trade(Side::Sell, 6, 90.0, 120, 0.0)];
        let rts = build_round_trips(&trades);
        assert_eq!(rts.len(), 2);
        assert_eq!(rts[0].quantity, 4);
        assert_eq!(rts[0].exit_price, Micros::from_f64(110.0).unwrap());
        assert_eq!(rts[1].quantity, 6);
        assert_eq!(rts[1].exit_price, Micros::from_f64(90.0).unwrap());
    }

    #[test]
    fn sell_past_flat_opens_a_short_lot() {
        let trades = vec![trade(Side::Buy, 5, 100.0, 0, 0.0), trade(Side::Sell, 8, 105.0, 60, 0.0), trade(Side::Buy, 3, 102.0, 120, 0.0)];
        let rts = build_round_trips(&trades);
        // first sell closes the 5-lot long, opens a 3-lot short
        // second buy closes the 3-lot short
        assert_eq!(rts.len(), 2);
        assert_eq!(rts[0].side, PositionSide::Long);
        assert_eq!(rts[0].quantity, 5);
        assert_eq!(rts[1].side, PositionSide::Short);
        assert_eq!(rts[1].quantity, 3);
    }

    #[test]
    fn unmatched_quantity_stays_open_and_produces_no_round_trip() {
        let trades = vec![trade(Side::Buy, 10, 100.0, 0, 0.0)];
        assert!(build_round_trips(&trades).is_empty());
    }
}
