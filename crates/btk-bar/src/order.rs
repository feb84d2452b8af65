//! Order, Trade, and the side/type/status enums shared across the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::micros::Micros;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

/// A trading intent. Mutable only by the replay engine while `PENDING`;
/// once terminal, fields are never rewritten — callers that need a
/// corrected order submit a new one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub price: Option<Micros>,
    pub stop_price: Option<Micros>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub created_at: i64,
    pub filled_at: Option<i64>,
    pub filled_price: Option<Micros>,
    pub reason: String,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: i64,
        price: Option<Micros>,
        stop_price: Option<Micros>,
        time_in_force: TimeInForce,
        created_at: i64,
        reason: impl Into<String>,
    ) -> Order {
        debug_assert!(quantity > 0, "order quantity must be > 0");
        Order {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price,
            stop_price,
            time_in_force,
            status: OrderStatus::Pending,
            created_at,
            filled_at: None,
            filled_price: None,
            reason: reason.into(),
        }
    }

    pub fn fill(&mut self, at: i64, price: Micros) {
        debug_assert!(!self.status.is_terminal());
        self.status = OrderStatus::Filled;
        self.filled_at = Some(at);
        self.filled_price = Some(price);
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.status.is_terminal());
        self.status = OrderStatus::Rejected;
        self.reason = reason.into();
    }

    pub fn cancel(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = OrderStatus::Cancelled;
    }
}

/// An executed fill. Immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Micros,
    pub timestamp: i64,
    pub commission: Micros,
    pub slippage: Micros,
    pub reason: String,
}

impl Trade {
    pub fn from_fill(order: &Order, commission: Micros, slippage: Micros) -> Trade {
        let price = order.filled_price.expect("fill() called before from_fill()");
        let timestamp = order.filled_at.expect("fill() called before from_fill()");
        Trade {
            id: Uuid::new_v4(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            timestamp,
            commission,
            slippage,
            reason: order.reason.clone(),
        }
    }

    /// Gross notional value of this trade, before commission/slippage.
    pub fn notional(&self) -> Option<Micros> {
        self.price.checked_mul_qty(self.quantity)
    }
}
