//! Managed position — the authoritative record of open exposure per symbol.

use super::fill::Fill;
use super::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantities below this are treated as zero, absorbing float rounding
/// from proportional partial closes.
pub const QTY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The order side that opens or adds to a position of this side.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// The order side that reduces or closes a position of this side.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

/// One open position per symbol: created on the first entry fill, mutated
/// on adds and partial closes, destroyed when quantity returns to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub current_stop: Option<f64>,
    pub realized_pnl: f64,
    pub fills: Vec<Fill>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn open(symbol: impl Into<String>, side: PositionSide, entry_fill: Fill) -> Self {
        let opened_at = entry_fill.timestamp;
        Self {
            symbol: symbol.into(),
            side,
            quantity: entry_fill.quantity,
            avg_entry_price: entry_fill.price,
            current_stop: None,
            realized_pnl: 0.0,
            fills: vec![entry_fill],
            opened_at,
            updated_at: opened_at,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.quantity.abs() < QTY_EPSILON
    }

    /// Signed price move multiplier: +1 for long, -1 for short.
    fn direction(&self) -> f64 {
        match self.side {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.direction() * (current_price - self.avg_entry_price) * self.quantity
    }

    /// Add to the position, accumulating a fill-quantity-weighted entry price.
    pub fn apply_entry_fill(&mut self, fill: Fill) {
        let prior_notional = self.avg_entry_price * self.quantity;
        self.quantity += fill.quantity;
        self.avg_entry_price = (prior_notional + fill.price * fill.quantity) / self.quantity;
        self.updated_at = fill.timestamp;
        self.fills.push(fill);
    }

    /// Reduce the position, realizing P&L proportional to the quantity
    /// closed. Returns the realized P&L of this reduction (commission on
    /// the closing fill is deducted).
    pub fn apply_exit_fill(&mut self, fill: Fill) -> f64 {
        let close_qty = fill.quantity.min(self.quantity);
        let pnl = self.direction() * (fill.price - self.avg_entry_price) * close_qty
            - fill.commission;
        self.quantity -= close_qty;
        if self.quantity.abs() < QTY_EPSILON {
            self.quantity = 0.0;
        }
        self.realized_pnl += pnl;
        self.updated_at = fill.timestamp;
        self.fills.push(fill);
        pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{ExecutionId, OrderId};
    use chrono::TimeZone;

    fn fill(qty: f64, price: f64, commission: f64) -> Fill {
        Fill {
            order_id: OrderId(1),
            execution_id: ExecutionId::new("X"),
            quantity: qty,
            price,
            commission,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 15, 0, 0).unwrap(),
        }
    }

    #[test]
    fn open_long_and_mark() {
        let pos = Position::open("AAPL", PositionSide::Long, fill(100.0, 150.0, 0.0));
        assert_eq!(pos.quantity, 100.0);
        assert_eq!(pos.avg_entry_price, 150.0);
        assert!((pos.unrealized_pnl(155.0) - 500.0).abs() < 1e-10);
        assert!(!pos.is_closed());
    }

    #[test]
    fn short_unrealized_pnl_inverts() {
        let pos = Position::open("AAPL", PositionSide::Short, fill(100.0, 150.0, 0.0));
        assert!((pos.unrealized_pnl(145.0) - 500.0).abs() < 1e-10);
        assert!((pos.unrealized_pnl(155.0) + 500.0).abs() < 1e-10);
    }

    #[test]
    fn add_accumulates_weighted_entry() {
        let mut pos = Position::open("AAPL", PositionSide::Long, fill(100.0, 100.0, 0.0));
        pos.apply_entry_fill(fill(50.0, 106.0, 0.0));
        assert_eq!(pos.quantity, 150.0);
        // (100*100 + 50*106) / 150 = 102
        assert!((pos.avg_entry_price - 102.0).abs() < 1e-10);
    }

    #[test]
    fn partial_close_realizes_proportionally() {
        let mut pos = Position::open("AAPL", PositionSide::Long, fill(100.0, 100.0, 0.0));
        let realized = pos.apply_exit_fill(fill(40.0, 110.0, 1.0));
        // (110 - 100) * 40 - 1 = 399
        assert!((realized - 399.0).abs() < 1e-10);
        assert_eq!(pos.quantity, 60.0);
        assert!(!pos.is_closed());
        assert!((pos.realized_pnl - 399.0).abs() < 1e-10);
    }

    #[test]
    fn full_close_zeroes_quantity_with_tolerance() {
        let mut pos = Position::open("AAPL", PositionSide::Long, fill(3.0, 100.0, 0.0));
        // Three partial closes of one third each leave float dust.
        pos.apply_exit_fill(fill(1.0, 101.0, 0.0));
        pos.apply_exit_fill(fill(1.0, 101.0, 0.0));
        pos.apply_exit_fill(fill(1.0 + 1e-9, 101.0, 0.0));
        assert!(pos.is_closed());
        assert_eq!(pos.quantity, 0.0);
    }

    #[test]
    fn exit_side_is_opposite_of_entry() {
        assert_eq!(PositionSide::Long.exit_order_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.exit_order_side(), OrderSide::Buy);
    }
}
