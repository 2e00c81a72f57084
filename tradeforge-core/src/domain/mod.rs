//! Domain types shared by the backtester and the execution layer.

pub mod bar;
pub mod equity;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod regime;
pub mod signal;
pub mod trade;

pub use bar::{Bar, Timeframe};
pub use equity::EquityPoint;
pub use fill::Fill;
pub use ids::{ExecutionId, FillId, IdGen, OrderId};
pub use order::{Order, OrderError, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use position::{Position, PositionSide, QTY_EPSILON};
pub use regime::Regime;
pub use signal::{Signal, SignalKind, Strategy};
pub use trade::{ExitReason, Trade};
