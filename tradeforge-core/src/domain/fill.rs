use super::ids::{ExecutionId, OrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single execution against an order.
///
/// Multiple fills may accumulate against one order; the order keeps the
/// fill-quantity-weighted average price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Notional value of the fill (price × quantity), before commission.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
