//! In-memory simulated venue.
//!
//! Implements the same order-submission contract as a real brokerage.
//! Every submitted order is evaluated after a configurable delay against
//! the venue's current price table: market orders fill at price ±
//! slippage, limit orders only once price has crossed, stop orders
//! convert to market on trigger. A configurable probability rejects the
//! order before any fill logic runs; another turns the fill into a
//! partial (50–100% of the requested quantity). Fills update the venue's
//! own position table and cash ledger.

use crate::venue::{AccountBalance, ExecutionVenue, VenueError, VenuePosition};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tradeforge_core::backtest::CommissionModel;
use tradeforge_core::domain::{
    ExecutionId, Fill, Order, OrderId, OrderSide, OrderStatus, OrderType, QTY_EPSILON,
};

#[derive(Debug, Clone)]
pub struct SimVenueConfig {
    pub initial_cash: f64,
    /// Delay between submission and the first fill evaluation.
    pub fill_delay: Duration,
    pub slippage_bps: f64,
    pub commission: CommissionModel,
    /// Probability an order is rejected before any fill logic runs.
    pub rejection_probability: f64,
    /// Probability a fill is partial (uniform 50–100% of requested).
    pub partial_fill_probability: f64,
    /// RNG seed so simulations are reproducible.
    pub seed: u64,
}

impl Default for SimVenueConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            fill_delay: Duration::from_millis(10),
            slippage_bps: 0.0,
            commission: CommissionModel::None,
            rejection_probability: 0.0,
            partial_fill_probability: 0.0,
            seed: 42,
        }
    }
}

struct SimState {
    orders: HashMap<OrderId, Order>,
    /// Orders that passed (or failed) the one-time rejection draw.
    screened: HashSet<OrderId>,
    positions: HashMap<String, VenuePosition>,
    prices: HashMap<String, f64>,
    cash: f64,
    rng: StdRng,
    next_exec: u64,
}

/// Simulated/paper venue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimulatedVenue {
    config: SimVenueConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedVenue {
    pub fn new(config: SimVenueConfig) -> Self {
        let state = SimState {
            orders: HashMap::new(),
            screened: HashSet::new(),
            positions: HashMap::new(),
            prices: HashMap::new(),
            cash: config.initial_cash,
            rng: StdRng::seed_from_u64(config.seed),
            next_exec: 0,
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Set the simulated current price and re-evaluate working orders for
    /// that symbol (limit/stop orders may now cross).
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().expect("sim venue lock");
        state.prices.insert(symbol.to_string(), price);

        let candidates: Vec<OrderId> = state
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.is_active() && !matches!(o.status, OrderStatus::Pending))
            .map(|o| o.id)
            .collect();
        for id in candidates {
            // Only orders that already went through the initial screening.
            if state.screened.contains(&id) {
                Self::try_fill(&mut state, &self.config, id);
            }
        }
    }

    /// First evaluation of an order after the fill delay: rejection draw,
    /// then fill logic.
    fn process_order(state: &mut SimState, config: &SimVenueConfig, id: OrderId) {
        let Some(order) = state.orders.get(&id) else {
            return;
        };
        if !order.is_active() {
            return;
        }
        state.screened.insert(id);

        if config.rejection_probability > 0.0
            && state.rng.gen::<f64>() < config.rejection_probability
        {
            let order = state.orders.get_mut(&id).expect("order exists");
            let _ = order.transition(
                OrderStatus::Rejected {
                    reason: "simulated venue rejection".into(),
                },
                Utc::now(),
            );
            debug!(order_id = %id, "simulated rejection");
            return;
        }

        Self::try_fill(state, config, id);
    }

    /// Attempt to fill a screened, working order against the current price.
    fn try_fill(state: &mut SimState, config: &SimVenueConfig, id: OrderId) {
        let Some(order) = state.orders.get(&id) else {
            return;
        };
        if !order.is_active() {
            return;
        }
        let symbol = order.symbol.clone();
        let side = order.side;
        let Some(&current) = state.prices.get(&symbol) else {
            // No market yet; the order keeps working until a price arrives.
            return;
        };

        let raw_fill_price = match &order.order_type {
            OrderType::Market => Some(Self::slip(current, side, config.slippage_bps)),
            OrderType::Limit { limit_price } => {
                let crossed = match side {
                    OrderSide::Buy => current <= *limit_price,
                    OrderSide::Sell => current >= *limit_price,
                };
                crossed.then_some(current)
            }
            OrderType::Stop { stop_price } => {
                let triggered = match side {
                    OrderSide::Buy => current >= *stop_price,
                    OrderSide::Sell => current <= *stop_price,
                };
                triggered.then(|| Self::slip(current, side, config.slippage_bps))
            }
            OrderType::StopLimit {
                stop_price,
                limit_price,
            } => {
                let triggered = match side {
                    OrderSide::Buy => current >= *stop_price,
                    OrderSide::Sell => current <= *stop_price,
                };
                let crossed = match side {
                    OrderSide::Buy => current <= *limit_price,
                    OrderSide::Sell => current >= *limit_price,
                };
                (triggered && crossed).then_some(current)
            }
        };
        let Some(fill_price) = raw_fill_price else {
            return;
        };

        let remaining = order.remaining_quantity();
        let fill_qty = if config.partial_fill_probability > 0.0
            && state.rng.gen::<f64>() < config.partial_fill_probability
        {
            let fraction = state.rng.gen_range(0.5..1.0);
            let qty = (remaining * fraction).floor();
            if qty >= 1.0 {
                qty
            } else {
                remaining * fraction
            }
        } else {
            remaining
        };

        state.next_exec += 1;
        let fill = Fill {
            order_id: id,
            execution_id: ExecutionId::new(format!("SIM-{}", state.next_exec)),
            quantity: fill_qty,
            price: fill_price,
            commission: config.commission.compute(fill_price * fill_qty),
            timestamp: Utc::now(),
        };

        Self::apply_to_ledger(state, &symbol, side, &fill);

        let order = state.orders.get_mut(&id).expect("order exists");
        if let Err(err) = order.record_fill(fill) {
            debug!(order_id = %id, %err, "fill bookkeeping rejected");
        }
    }

    fn slip(price: f64, side: OrderSide, bps: f64) -> f64 {
        let fraction = bps / 10_000.0;
        match side {
            OrderSide::Buy => price * (1.0 + fraction),
            OrderSide::Sell => price * (1.0 - fraction),
        }
    }

    /// Update the venue's position table and cash ledger for a fill.
    /// Buys consume cash by notional, sells release it; commission always
    /// comes out of cash.
    fn apply_to_ledger(state: &mut SimState, symbol: &str, side: OrderSide, fill: &Fill) {
        let signed = match side {
            OrderSide::Buy => fill.quantity,
            OrderSide::Sell => -fill.quantity,
        };
        let entry = state
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| VenuePosition {
                symbol: symbol.to_string(),
                quantity: 0.0,
                avg_price: 0.0,
            });

        let prior = entry.quantity;
        let next = prior + signed;
        if prior == 0.0 || prior.signum() == signed.signum() {
            // Opening or adding: weighted average entry price.
            let prior_notional = entry.avg_price * prior.abs();
            let added_notional = fill.price * fill.quantity;
            let total = prior.abs() + fill.quantity;
            entry.avg_price = (prior_notional + added_notional) / total;
        } else if next != 0.0 && prior.signum() != next.signum() {
            // Flipped through zero: the remainder starts at the fill price.
            entry.avg_price = fill.price;
        }
        entry.quantity = next;
        if entry.quantity.abs() < QTY_EPSILON {
            state.positions.remove(symbol);
        }

        match side {
            OrderSide::Buy => state.cash -= fill.notional(),
            OrderSide::Sell => state.cash += fill.notional(),
        }
        state.cash -= fill.commission;
    }
}

#[async_trait]
impl ExecutionVenue for SimulatedVenue {
    async fn submit_order(&self, order: &Order) -> Result<OrderId, VenueError> {
        let id = order.id;
        {
            let mut state = self.state.lock().expect("sim venue lock");
            let mut accepted = order.clone();
            accepted
                .transition(OrderStatus::Submitted, Utc::now())
                .map_err(|e| VenueError::Rejected {
                    reason: e.to_string(),
                })?;
            state.orders.insert(id, accepted);
        }

        // Evaluate after the configured processing delay.
        let venue = self.clone();
        tokio::spawn(async move {
            sleep(venue.config.fill_delay).await;
            let mut state = venue.state.lock().expect("sim venue lock");
            SimulatedVenue::process_order(&mut state, &venue.config, id);
        });

        Ok(id)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<bool, VenueError> {
        let mut state = self.state.lock().expect("sim venue lock");
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(VenueError::OrderNotFound(id))?;
        if order.is_terminal() {
            return Ok(false);
        }
        let _ = order.transition(
            OrderStatus::Cancelled {
                reason: "cancelled at venue".into(),
            },
            Utc::now(),
        );
        Ok(true)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order, VenueError> {
        let state = self.state.lock().expect("sim venue lock");
        state
            .orders
            .get(&id)
            .cloned()
            .ok_or(VenueError::OrderNotFound(id))
    }

    async fn get_open_orders(&self) -> Result<Vec<Order>, VenueError> {
        let state = self.state.lock().expect("sim venue lock");
        Ok(state
            .orders
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<VenuePosition>, VenueError> {
        let state = self.state.lock().expect("sim venue lock");
        Ok(state.positions.values().cloned().collect())
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, VenueError> {
        let state = self.state.lock().expect("sim venue lock");
        let position_value: f64 = state
            .positions
            .values()
            .map(|p| {
                let price = state.prices.get(&p.symbol).copied().unwrap_or(p.avg_price);
                p.quantity * price
            })
            .sum();
        Ok(AccountBalance {
            cash: state.cash,
            equity: state.cash + position_value,
            buying_power: state.cash,
        })
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, VenueError> {
        let state = self.state.lock().expect("sim venue lock");
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }
}
