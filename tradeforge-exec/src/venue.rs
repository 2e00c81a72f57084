//! The pluggable execution venue contract.
//!
//! Implemented in production by `SimulatedVenue`; a real brokerage
//! adapter implements the same trait and slots in unchanged.

use async_trait::async_trait;
use thiserror::Error;
use tradeforge_core::domain::{Order, OrderId};

/// Account state as the venue reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub cash: f64,
    pub equity: f64,
    pub buying_power: f64,
}

/// A position as the venue reports it. Quantity is signed: positive long,
/// negative short.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePosition {
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
}

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("order {0} not found at venue")]
    OrderNotFound(OrderId),

    #[error("venue rejected order: {reason}")]
    Rejected { reason: String },

    #[error("no price available for symbol '{0}'")]
    UnknownSymbol(String),

    #[error("venue transport error: {0}")]
    Transport(String),
}

/// Order-submission contract shared by simulated and real venues.
///
/// All methods are async: a real adapter suspends on the wire, the
/// simulated venue suspends on its configured processing delay.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Submit an order. Returns the venue's acknowledgement of the order id.
    async fn submit_order(&self, order: &Order) -> Result<OrderId, VenueError>;

    /// Cancel a working order. Returns false if the order was already
    /// terminal at the venue.
    async fn cancel_order(&self, id: OrderId) -> Result<bool, VenueError>;

    /// Current state of an order, including accumulated fills.
    async fn get_order(&self, id: OrderId) -> Result<Order, VenueError>;

    /// All orders still working at the venue.
    async fn get_open_orders(&self) -> Result<Vec<Order>, VenueError>;

    /// The venue's authoritative position report.
    async fn get_positions(&self) -> Result<Vec<VenuePosition>, VenueError>;

    async fn get_account_balance(&self) -> Result<AccountBalance, VenueError>;

    async fn get_current_price(&self, symbol: &str) -> Result<f64, VenueError>;
}
