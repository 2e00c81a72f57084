//! Order router — gates every order through validation, then tracks it
//! at the venue until a terminal state.
//!
//! The status poll is a timer-driven task per order, not a busy loop.
//! Each observed transition emits exactly one event; newly observed fills
//! are forwarded to the position manager in arrival order. Poll tasks are
//! tracked so shutdown and cancellation stop them deterministically.

use crate::event::{ErrorSeverity, EventBus, ExecutionEvent};
use crate::positions::{PositionManager, PositionUpdate};
use crate::risk::{DailyOrderCounter, OrderValidator, RiskLimits, ValidationReport};
use crate::venue::{ExecutionVenue, VenueError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use tradeforge_core::domain::{IdGen, Order, OrderId, OrderStatus, OrderType};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Bounded interval between status polls per order.
    pub poll_interval: Duration,
    pub limits: RiskLimits,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            limits: RiskLimits::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("order failed pre-trade validation: {}", .0.rejection_reason())]
    Validation(ValidationReport),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("order {0} is not tracked by this router")]
    UnknownOrder(OrderId),

    #[error("order {0} is already terminal and cannot be modified")]
    Terminal(OrderId),
}

/// Requested changes for `modify_order`. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct OrderModification {
    pub quantity: Option<f64>,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
}

/// Validates, submits, and tracks orders against a pluggable venue.
pub struct OrderRouter {
    venue: Arc<dyn ExecutionVenue>,
    bus: Arc<EventBus>,
    validator: OrderValidator,
    id_gen: Arc<IdGen>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    poll_tasks: Arc<StdMutex<HashMap<OrderId, JoinHandle<()>>>>,
    daily: StdMutex<DailyOrderCounter>,
    positions: Option<Arc<PositionManager>>,
    poll_interval: Duration,
}

impl OrderRouter {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        bus: Arc<EventBus>,
        id_gen: Arc<IdGen>,
        config: RouterConfig,
    ) -> Self {
        Self {
            venue,
            bus,
            validator: OrderValidator::new(config.limits),
            id_gen,
            orders: Arc::new(RwLock::new(HashMap::new())),
            poll_tasks: Arc::new(StdMutex::new(HashMap::new())),
            daily: StdMutex::new(DailyOrderCounter::new(Utc::now())),
            positions: None,
            poll_interval: config.poll_interval,
        }
    }

    /// Forward observed fills to a position manager.
    pub fn with_position_manager(mut self, positions: Arc<PositionManager>) -> Self {
        self.positions = Some(positions);
        self
    }

    pub fn id_gen(&self) -> &Arc<IdGen> {
        &self.id_gen
    }

    /// Validate and submit an order, then start polling it to a terminal
    /// state.
    ///
    /// Validation failure is synchronous: the order never reaches the
    /// venue, one rejected-order event fires, and the report is returned
    /// in the error.
    pub async fn submit_order(&self, mut order: Order) -> Result<OrderId, RouterError> {
        let account = self.venue.get_account_balance().await?;
        let estimated_price = self.venue.get_current_price(&order.symbol).await.ok();
        let open_positions = match &self.positions {
            Some(pm) => pm.open_position_count().await,
            None => self.venue.get_positions().await?.len(),
        };
        let daily_orders = {
            let mut daily = self.daily.lock().expect("daily counter lock");
            daily.current(Utc::now())
        };

        let report = self.validator.validate(
            &order,
            &account,
            open_positions,
            daily_orders,
            estimated_price,
        );
        for check in report.failures() {
            debug!(order_id = %order.id, check = %check.name, message = %check.message, "validation check failed");
        }
        if !report.passed() {
            let reason = report.rejection_reason();
            warn!(order_id = %order.id, %reason, "order rejected pre-submission");
            let _ = order.transition(
                OrderStatus::Rejected {
                    reason: reason.clone(),
                },
                Utc::now(),
            );
            self.orders.write().await.insert(order.id, order.clone());
            self.bus
                .publish(ExecutionEvent::OrderRejected { order, reason });
            return Err(RouterError::Validation(report));
        }

        let id = match self.venue.submit_order(&order).await {
            Ok(id) => id,
            Err(err) => {
                let reason = err.to_string();
                let _ = order.transition(
                    OrderStatus::Rejected {
                        reason: reason.clone(),
                    },
                    Utc::now(),
                );
                self.orders.write().await.insert(order.id, order.clone());
                self.bus
                    .publish(ExecutionEvent::OrderRejected { order, reason });
                return Err(err.into());
            }
        };

        self.daily
            .lock()
            .expect("daily counter lock")
            .increment(Utc::now());

        let _ = order.transition(OrderStatus::Submitted, Utc::now());
        self.orders.write().await.insert(id, order.clone());
        self.bus.publish(ExecutionEvent::OrderSubmitted { order });

        self.spawn_poll_task(id);
        Ok(id)
    }

    /// Cancel a tracked order. A no-op returning false when the order is
    /// already terminal.
    pub async fn cancel_order(&self, id: OrderId) -> Result<bool, RouterError> {
        let is_terminal = {
            let orders = self.orders.read().await;
            let order = orders.get(&id).ok_or(RouterError::UnknownOrder(id))?;
            order.is_terminal()
        };
        if is_terminal {
            return Ok(false);
        }
        Ok(self.venue.cancel_order(id).await?)
    }

    /// Cancel-and-replace with modified parameters. Returns the
    /// replacement's id.
    pub async fn modify_order(
        &self,
        id: OrderId,
        modification: OrderModification,
    ) -> Result<OrderId, RouterError> {
        let original = {
            let orders = self.orders.read().await;
            orders
                .get(&id)
                .cloned()
                .ok_or(RouterError::UnknownOrder(id))?
        };

        if !self.cancel_order(id).await? {
            return Err(RouterError::Terminal(id));
        }

        let mut replacement = Order::new(
            self.id_gen.next_order_id(),
            original.symbol.clone(),
            original.side,
            modified_type(&original.order_type, &modification),
            modification.quantity.unwrap_or(original.quantity),
            Utc::now(),
        );
        replacement.time_in_force = original.time_in_force;
        replacement
            .metadata
            .insert("replaces".to_string(), id.to_string());
        self.submit_order(replacement).await
    }

    pub async fn get_order(&self, id: OrderId) -> Option<Order> {
        self.orders.read().await.get(&id).cloned()
    }

    pub async fn get_orders(&self) -> Vec<Order> {
        let mut all: Vec<Order> = self.orders.read().await.values().cloned().collect();
        all.sort_by_key(|o| o.id.0);
        all
    }

    /// Stop every polling task. Cancellation is order-scoped during
    /// normal operation; this is the shutdown path.
    pub fn shutdown(&self) {
        let mut tasks = self.poll_tasks.lock().expect("poll task lock");
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }

    /// Timer-driven status poll for one order: re-fetch until terminal,
    /// emit one event per observed transition, forward new fills.
    fn spawn_poll_task(&self, id: OrderId) {
        let venue = Arc::clone(&self.venue);
        let bus = Arc::clone(&self.bus);
        let orders = Arc::clone(&self.orders);
        let positions = self.positions.clone();
        let poll_tasks = Arc::clone(&self.poll_tasks);
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            // The first tick completes immediately; skip straight to waiting.
            ticker.tick().await;
            let mut last_tag = "submitted";
            let mut seen_fills = 0usize;

            loop {
                ticker.tick().await;
                let fetched = match venue.get_order(id).await {
                    Ok(order) => order,
                    Err(err) => {
                        error!(order_id = %id, %err, "status poll failed");
                        bus.publish(ExecutionEvent::ExecutionError {
                            severity: ErrorSeverity::Error,
                            context: format!("poll order {id}"),
                            message: err.to_string(),
                        });
                        break;
                    }
                };

                // Forward fills the book has not seen yet, in order.
                if fetched.fills.len() > seen_fills {
                    for fill in &fetched.fills[seen_fills..] {
                        if let Some(pm) = &positions {
                            let update =
                                pm.apply_fill(&fetched.symbol, fetched.side, fill.clone()).await;
                            match update {
                                PositionUpdate::Opened(position) => {
                                    bus.publish(ExecutionEvent::PositionOpened { position });
                                }
                                PositionUpdate::Closed {
                                    symbol,
                                    realized_pnl,
                                } => {
                                    bus.publish(ExecutionEvent::PositionClosed {
                                        symbol,
                                        realized_pnl,
                                    });
                                }
                                PositionUpdate::Increased(_)
                                | PositionUpdate::Reduced { .. } => {}
                            }
                        }
                    }
                    seen_fills = fetched.fills.len();
                }

                orders.write().await.insert(id, fetched.clone());

                let tag = fetched.status.tag();
                if tag != last_tag {
                    last_tag = tag;
                    let event = match &fetched.status {
                        OrderStatus::PartiallyFilled => {
                            Some(ExecutionEvent::OrderPartiallyFilled {
                                order: fetched.clone(),
                            })
                        }
                        OrderStatus::Filled => Some(ExecutionEvent::OrderFilled {
                            order: fetched.clone(),
                        }),
                        OrderStatus::Cancelled { .. } => Some(ExecutionEvent::OrderCancelled {
                            order: fetched.clone(),
                        }),
                        OrderStatus::Rejected { reason } => {
                            Some(ExecutionEvent::OrderRejected {
                                reason: reason.clone(),
                                order: fetched.clone(),
                            })
                        }
                        OrderStatus::Expired => Some(ExecutionEvent::OrderExpired {
                            order: fetched.clone(),
                        }),
                        OrderStatus::Pending | OrderStatus::Submitted => None,
                    };
                    if let Some(event) = event {
                        bus.publish(event);
                    }
                }

                if fetched.is_terminal() {
                    break;
                }
            }

            poll_tasks.lock().expect("poll task lock").remove(&id);
        });

        self.poll_tasks
            .lock()
            .expect("poll task lock")
            .insert(id, task);
    }
}

/// Apply price modifications to an order type, keeping its shape.
fn modified_type(original: &OrderType, modification: &OrderModification) -> OrderType {
    match original {
        OrderType::Market => OrderType::Market,
        OrderType::Limit { limit_price } => OrderType::Limit {
            limit_price: modification.limit_price.unwrap_or(*limit_price),
        },
        OrderType::Stop { stop_price } => OrderType::Stop {
            stop_price: modification.stop_price.unwrap_or(*stop_price),
        },
        OrderType::StopLimit {
            stop_price,
            limit_price,
        } => OrderType::StopLimit {
            stop_price: modification.stop_price.unwrap_or(*stop_price),
            limit_price: modification.limit_price.unwrap_or(*limit_price),
        },
    }
}
