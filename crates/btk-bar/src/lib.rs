//! Canonical data model for the backtesting core: fixed-point money, bars,
//! orders/trades, positions, portfolio state, signals, and round trips.
//!
//! Nothing here does IO. Everything is a pure value type or a pure
//! constructor/validator over value types — the replay engine and data
//! manager are the callers that give these types meaning over time.

mod bar;
mod micros;
mod order;
mod portfolio;
mod position;
mod roundtrip;
mod signal;

pub use bar::{validate_ohlcv, Bar, BarSeries, BarValidationError, Interval, SeriesError};
pub use micros::{Micros, ParseMicrosError};
pub use order::{Order, OrderStatus, OrderType, Side, TimeInForce, Trade};
pub use portfolio::{push_equity_point, EquityPoint, Portfolio};
pub use position::{Position, PositionSide};
pub use roundtrip::RoundTrip;
pub use signal::{Signal, SignalStrength, SignalType};
