//! Order types and the order lifecycle state machine.

use super::fill::Fill;
use super::ids::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Which way the order trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// What kind of order and its price parameters.
///
/// Prices live inside the variant, so an absent limit or stop price is
/// unrepresentable rather than a sentinel zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderType {
    /// Fill at the venue's current price.
    Market,
    /// Fill at the limit price or better.
    Limit { limit_price: f64 },
    /// Converts to a market order once the stop price is crossed.
    Stop { stop_price: f64 },
    /// Converts to a limit order once the stop price is crossed.
    StopLimit { stop_price: f64, limit_price: f64 },
}

impl OrderType {
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Limit { limit_price } | OrderType::StopLimit { limit_price, .. } => {
                Some(*limit_price)
            }
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        match self {
            OrderType::Stop { stop_price } | OrderType::StopLimit { stop_price, .. } => {
                Some(*stop_price)
            }
            _ => None,
        }
    }
}

/// How long the order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Good until cancelled.
    Gtc,
    /// Expires at the end of the trading day.
    Day,
    /// Immediate-or-cancel.
    Ioc,
}

/// Order lifecycle states.
///
/// `Pending → Submitted → {PartiallyFilled → Filled | Cancelled | Rejected | Expired}`.
/// Terminal states are immutable; `Order::transition` rejects everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet accepted by a venue.
    Pending,
    /// Accepted by the venue, working.
    Submitted,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled with a reason (caller cancel, replace, venue action).
    Cancelled { reason: String },
    /// Declined by the venue or by pre-trade validation.
    Rejected { reason: String },
    /// Expired (e.g. day order at session end).
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled { .. }
                | OrderStatus::Rejected { .. }
                | OrderStatus::Expired
        )
    }

    /// Short tag for logging and event labelling.
    pub fn tag(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled { .. } => "cancelled",
            OrderStatus::Rejected { .. } => "rejected",
            OrderStatus::Expired => "expired",
        }
    }
}

/// Errors from order state operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid transition for order {0}: {1} → {2}")]
    InvalidTransition(OrderId, String, String),

    #[error("fill quantity {fill} exceeds remaining quantity {remaining} on order {id}")]
    Overfill { id: OrderId, fill: f64, remaining: f64 },

    #[error("non-positive fill quantity {0} on order {1}")]
    NonPositiveFill(f64, OrderId),
}

/// A single order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    /// Fill-quantity-weighted mean of all fill prices; 0.0 until the first fill.
    pub avg_fill_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub fills: Vec<Fill>,
    pub metadata: HashMap<String, String>,
}

impl Order {
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            time_in_force: TimeInForce::Gtc,
            status: OrderStatus::Pending,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            created_at: now,
            updated_at: now,
            filled_at: None,
            cancelled_at: None,
            fills: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn market(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, symbol, side, OrderType::Market, quantity, now)
    }

    pub fn limit(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        limit_price: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, symbol, side, OrderType::Limit { limit_price }, quantity, now)
    }

    pub fn stop(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, symbol, side, OrderType::Stop { stop_price }, quantity, now)
    }

    pub fn remaining_quantity(&self) -> f64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    /// Whether the state machine permits `from → to`.
    fn allows(from: &OrderStatus, to: &OrderStatus) -> bool {
        use OrderStatus::*;
        match (from, to) {
            (Pending, Submitted) => true,
            (Pending, Cancelled { .. }) | (Pending, Rejected { .. }) => true,
            (Submitted, PartiallyFilled) | (Submitted, Filled) => true,
            (Submitted, Cancelled { .. }) | (Submitted, Rejected { .. }) | (Submitted, Expired) => {
                true
            }
            (PartiallyFilled, Filled) => true,
            (PartiallyFilled, Cancelled { .. }) | (PartiallyFilled, Expired) => true,
            // Repeated partial fills keep the same status.
            (PartiallyFilled, PartiallyFilled) => true,
            _ => false,
        }
    }

    /// Transition to a new status, enforcing the lifecycle state machine.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !Self::allows(&self.status, &to) {
            return Err(OrderError::InvalidTransition(
                self.id,
                self.status.tag().to_string(),
                to.tag().to_string(),
            ));
        }
        match &to {
            OrderStatus::Filled => self.filled_at = Some(now),
            OrderStatus::Cancelled { .. } => self.cancelled_at = Some(now),
            _ => {}
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Record a fill: accumulate quantity, recompute the weighted average
    /// fill price, and advance the status (PartiallyFilled or Filled).
    pub fn record_fill(&mut self, fill: Fill) -> Result<(), OrderError> {
        if fill.quantity <= 0.0 {
            return Err(OrderError::NonPositiveFill(fill.quantity, self.id));
        }
        let remaining = self.remaining_quantity();
        if fill.quantity > remaining + 1e-9 {
            return Err(OrderError::Overfill {
                id: self.id,
                fill: fill.quantity,
                remaining,
            });
        }

        let prior_notional = self.avg_fill_price * self.filled_quantity;
        self.filled_quantity += fill.quantity;
        self.avg_fill_price = (prior_notional + fill.price * fill.quantity) / self.filled_quantity;

        let now = fill.timestamp;
        self.fills.push(fill);

        if self.remaining_quantity() <= 1e-9 {
            self.transition(OrderStatus::Filled, now)
        } else {
            self.transition(OrderStatus::PartiallyFilled, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ExecutionId;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap()
    }

    fn fill(order_id: OrderId, qty: f64, price: f64) -> Fill {
        Fill {
            order_id,
            execution_id: ExecutionId::new("X-1"),
            quantity: qty,
            price,
            commission: 0.0,
            timestamp: t0(),
        }
    }

    fn submitted_order() -> Order {
        let mut order = Order::market(OrderId(1), "AAPL", OrderSide::Buy, 100.0, t0());
        order.transition(OrderStatus::Submitted, t0()).unwrap();
        order
    }

    #[test]
    fn new_order_is_pending() {
        let order = Order::market(OrderId(1), "AAPL", OrderSide::Buy, 100.0, t0());
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.is_active());
        assert_eq!(order.remaining_quantity(), 100.0);
    }

    #[test]
    fn full_fill_reaches_filled() {
        let mut order = submitted_order();
        order.record_fill(fill(order.id, 100.0, 185.0)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, 100.0);
        assert_eq!(order.avg_fill_price, 185.0);
        assert!(order.filled_at.is_some());
        assert!(order.is_terminal());
    }

    #[test]
    fn partial_fills_accumulate_weighted_average() {
        let mut order = submitted_order();
        order.record_fill(fill(order.id, 40.0, 100.0)).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        order.record_fill(fill(order.id, 60.0, 110.0)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        // (40*100 + 60*110) / 100 = 106
        assert!((order.avg_fill_price - 106.0).abs() < 1e-10);
        assert_eq!(order.fills.len(), 2);
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = submitted_order();
        let result = order.record_fill(fill(order.id, 150.0, 100.0));
        assert!(matches!(result, Err(OrderError::Overfill { .. })));
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut order = submitted_order();
        order
            .transition(
                OrderStatus::Cancelled {
                    reason: "caller cancel".into(),
                },
                t0(),
            )
            .unwrap();
        assert!(order
            .transition(OrderStatus::Submitted, t0())
            .is_err());
        assert!(order.transition(OrderStatus::Filled, t0()).is_err());
    }

    #[test]
    fn pending_cannot_skip_to_filled() {
        let mut order = Order::market(OrderId(1), "AAPL", OrderSide::Buy, 100.0, t0());
        assert!(order.transition(OrderStatus::Filled, t0()).is_err());
    }

    #[test]
    fn pending_can_be_rejected() {
        let mut order = Order::market(OrderId(1), "AAPL", OrderSide::Buy, 100.0, t0());
        order
            .transition(
                OrderStatus::Rejected {
                    reason: "validation failed".into(),
                },
                t0(),
            )
            .unwrap();
        assert!(order.is_terminal());
    }

    #[test]
    fn order_type_price_accessors() {
        let limit = OrderType::Limit { limit_price: 99.5 };
        assert_eq!(limit.limit_price(), Some(99.5));
        assert_eq!(limit.stop_price(), None);

        let stop_limit = OrderType::StopLimit {
            stop_price: 95.0,
            limit_price: 94.5,
        };
        assert_eq!(stop_limit.stop_price(), Some(95.0));
        assert_eq!(stop_limit.limit_price(), Some(94.5));

        assert_eq!(OrderType::Market.limit_price(), None);
    }

    #[test]
    fn order_serialization_roundtrip() {
        let order = Order::stop(OrderId(9), "MSFT", OrderSide::Sell, 50.0, 395.0, t0());
        let json = serde_json::to_string(&order).unwrap();
        let deser: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order.id, deser.id);
        assert_eq!(order.order_type, deser.order_type);
        assert_eq!(order.status, deser.status);
    }
}
