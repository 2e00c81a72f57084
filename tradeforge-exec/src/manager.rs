//! Execution manager — the single entry point wiring strategy signals to
//! the router and position manager.
//!
//! Entry signals become sized orders (plus a companion stop once the
//! entry acknowledgement is observed, when auto-stop is on). Exit signals
//! close the managed position in full; a missing position is a warning,
//! not an error. Stop adjustments cancel-and-replace the working stop;
//! ratchet discipline is the caller's responsibility. A background task
//! reconciles periodically and publishes a reconciliation-complete event
//! whenever discrepancies are non-empty. Unexpected failures during
//! signal handling are caught and surfaced as error events; the manager
//! never crashes on them.

use crate::event::{ErrorSeverity, EventBus, EventKind, ExecutionEvent};
use crate::positions::PositionManager;
use crate::router::{OrderModification, OrderRouter, RouterConfig, RouterError};
use crate::venue::{AccountBalance, ExecutionVenue, VenueError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tradeforge_core::domain::{
    IdGen, Order, OrderId, Position, Signal, SignalKind,
};

#[derive(Debug, Clone)]
pub struct ExecutionManagerConfig {
    /// Submit a companion protective stop after an entry that carries one.
    pub auto_stop: bool,
    /// Order size when a signal carries no explicit quantity.
    pub default_quantity: f64,
    pub reconcile_interval: Duration,
}

impl Default for ExecutionManagerConfig {
    fn default() -> Self {
        Self {
            auto_stop: true,
            default_quantity: 1.0,
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

/// Aggregate execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub signals_handled: usize,
    pub orders_submitted: usize,
    pub orders_filled: usize,
    pub orders_rejected: usize,
    pub orders_cancelled: usize,
    pub execution_errors: usize,
    pub reconciliation_runs: usize,
    pub discrepancies_found: usize,
}

pub struct ExecutionManager {
    venue: Arc<dyn ExecutionVenue>,
    router: Arc<OrderRouter>,
    positions: Arc<PositionManager>,
    bus: Arc<EventBus>,
    id_gen: Arc<IdGen>,
    config: ExecutionManagerConfig,
    /// Working protective stop per symbol, for cancel/replace.
    stop_orders: Mutex<HashMap<String, OrderId>>,
    stats: Arc<StdMutex<ExecutionStats>>,
    background: StdMutex<Vec<JoinHandle<()>>>,
}

impl ExecutionManager {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        router_config: RouterConfig,
        config: ExecutionManagerConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let id_gen = Arc::new(IdGen::new());
        let positions = Arc::new(PositionManager::new());
        let router = Arc::new(
            OrderRouter::new(
                Arc::clone(&venue),
                Arc::clone(&bus),
                Arc::clone(&id_gen),
                router_config,
            )
            .with_position_manager(Arc::clone(&positions)),
        );

        Self {
            venue,
            router,
            positions,
            bus,
            id_gen,
            config,
            stop_orders: Mutex::new(HashMap::new()),
            stats: Arc::new(StdMutex::new(ExecutionStats::default())),
            background: StdMutex::new(Vec::new()),
        }
    }

    /// Start the background tasks: statistics aggregation and the
    /// periodic reconciliation timer.
    pub fn start(&self) {
        self.spawn_stats_task();
        self.spawn_reconciliation_task();
    }

    /// Stop background tasks and all order polling deterministically.
    pub fn shutdown(&self) {
        for task in self.background.lock().expect("background lock").drain(..) {
            task.abort();
        }
        self.router.shutdown();
    }

    // ── Signal handling ────────────────────────────────────────────────

    /// Handle one strategy signal. Failures are caught, logged, and
    /// surfaced as severity-error events.
    pub async fn handle_signal(&self, signal: &Signal) {
        self.stats.lock().expect("stats lock").signals_handled += 1;

        if let Err(err) = self.dispatch_signal(signal).await {
            error!(symbol = %signal.symbol, %err, "signal handling failed");
            self.stats.lock().expect("stats lock").execution_errors += 1;
            self.bus.publish(ExecutionEvent::ExecutionError {
                severity: ErrorSeverity::Error,
                context: format!("signal for {}", signal.symbol),
                message: err.to_string(),
            });
        }
    }

    async fn dispatch_signal(&self, signal: &Signal) -> Result<(), RouterError> {
        match &signal.kind {
            SignalKind::Entry { initial_stop } => {
                let quantity = signal
                    .quantity
                    .unwrap_or(self.config.default_quantity);
                let order = Order::market(
                    self.id_gen.next_order_id(),
                    signal.symbol.clone(),
                    signal.direction.entry_order_side(),
                    quantity,
                    Utc::now(),
                );
                // The returned ack is the entry order's acknowledgement;
                // only then may the companion stop go out.
                let entry_id = self.router.submit_order(order).await?;
                info!(symbol = %signal.symbol, order_id = %entry_id, "entry order submitted");

                if self.config.auto_stop {
                    if let Some(stop) = initial_stop {
                        let stop_order = Order::stop(
                            self.id_gen.next_order_id(),
                            signal.symbol.clone(),
                            signal.direction.exit_order_side(),
                            quantity,
                            *stop,
                            Utc::now(),
                        );
                        let stop_id = self.router.submit_order(stop_order).await?;
                        self.stop_orders
                            .lock()
                            .await
                            .insert(signal.symbol.clone(), stop_id);
                    }
                }
                Ok(())
            }
            SignalKind::Exit => {
                let Some(position) = self.positions.get_position(&signal.symbol).await else {
                    warn!(symbol = %signal.symbol, "exit signal with no open position");
                    return Ok(());
                };

                // Retire the protective stop before closing.
                if let Some(stop_id) = self.stop_orders.lock().await.remove(&signal.symbol) {
                    let _ = self.router.cancel_order(stop_id).await;
                }

                let order = Order::market(
                    self.id_gen.next_order_id(),
                    signal.symbol.clone(),
                    position.side.exit_order_side(),
                    position.quantity,
                    Utc::now(),
                );
                self.router.submit_order(order).await?;
                Ok(())
            }
            SignalKind::StopAdjustment { stop } => {
                let Some(position) = self.positions.get_position(&signal.symbol).await else {
                    warn!(symbol = %signal.symbol, "stop adjustment with no open position");
                    return Ok(());
                };

                if let Some(old_id) = self.stop_orders.lock().await.remove(&signal.symbol) {
                    let _ = self.router.cancel_order(old_id).await;
                }
                let stop_order = Order::stop(
                    self.id_gen.next_order_id(),
                    signal.symbol.clone(),
                    position.side.exit_order_side(),
                    position.quantity,
                    *stop,
                    Utc::now(),
                );
                let stop_id = self.router.submit_order(stop_order).await?;
                self.stop_orders
                    .lock()
                    .await
                    .insert(signal.symbol.clone(), stop_id);
                Ok(())
            }
        }
    }

    // ── Execution surface (passthrough) ────────────────────────────────

    pub async fn submit_order(&self, order: Order) -> Result<OrderId, RouterError> {
        self.router.submit_order(order).await
    }

    pub async fn cancel_order(&self, id: OrderId) -> Result<bool, RouterError> {
        self.router.cancel_order(id).await
    }

    pub async fn modify_order(
        &self,
        id: OrderId,
        modification: OrderModification,
    ) -> Result<OrderId, RouterError> {
        self.router.modify_order(id, modification).await
    }

    pub async fn get_order(&self, id: OrderId) -> Option<Order> {
        self.router.get_order(id).await
    }

    pub async fn get_orders(&self) -> Vec<Order> {
        self.router.get_orders().await
    }

    pub async fn get_positions(&self) -> Vec<Position> {
        self.positions.get_positions().await
    }

    pub async fn get_account_balance(&self) -> Result<AccountBalance, VenueError> {
        self.venue.get_account_balance().await
    }

    pub async fn get_current_price(&self, symbol: &str) -> Result<f64, VenueError> {
        self.venue.get_current_price(symbol).await
    }

    pub fn subscribe(&self, kind: EventKind) -> broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe_all()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats.lock().expect("stats lock").clone()
    }

    /// Trigger one reconciliation pass immediately (also runs on the
    /// background timer).
    pub async fn reconcile_now(&self) -> Result<usize, VenueError> {
        let discrepancies = self.positions.reconcile(self.venue.as_ref()).await?;
        let count = discrepancies.len();
        {
            let mut stats = self.stats.lock().expect("stats lock");
            stats.reconciliation_runs += 1;
            stats.discrepancies_found += count;
        }
        if !discrepancies.is_empty() {
            self.bus
                .publish(ExecutionEvent::ReconciliationComplete { discrepancies });
        }
        Ok(count)
    }

    /// Explicit operator re-sync from the venue's position report.
    pub async fn force_sync_positions(&self) -> Result<usize, VenueError> {
        self.positions.force_sync(self.venue.as_ref()).await
    }

    // ── Background tasks ───────────────────────────────────────────────

    fn spawn_stats_task(&self) {
        let mut events = self.bus.subscribe_all();
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let mut stats = stats.lock().expect("stats lock");
                        match event {
                            ExecutionEvent::OrderSubmitted { .. } => stats.orders_submitted += 1,
                            ExecutionEvent::OrderFilled { .. } => stats.orders_filled += 1,
                            ExecutionEvent::OrderRejected { .. } => stats.orders_rejected += 1,
                            ExecutionEvent::OrderCancelled { .. } => stats.orders_cancelled += 1,
                            _ => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stats subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.background.lock().expect("background lock").push(task);
    }

    fn spawn_reconciliation_task(&self) {
        let positions = Arc::clone(&self.positions);
        let venue = Arc::clone(&self.venue);
        let bus = Arc::clone(&self.bus);
        let stats = Arc::clone(&self.stats);
        let interval = self.config.reconcile_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match positions.reconcile(venue.as_ref()).await {
                    Ok(discrepancies) => {
                        let mut s = stats.lock().expect("stats lock");
                        s.reconciliation_runs += 1;
                        s.discrepancies_found += discrepancies.len();
                        drop(s);
                        if !discrepancies.is_empty() {
                            bus.publish(ExecutionEvent::ReconciliationComplete { discrepancies });
                        }
                    }
                    Err(err) => {
                        error!(%err, "periodic reconciliation failed");
                        bus.publish(ExecutionEvent::ExecutionError {
                            severity: ErrorSeverity::Error,
                            context: "periodic reconciliation".to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }
        });
        self.background.lock().expect("background lock").push(task);
    }
}
