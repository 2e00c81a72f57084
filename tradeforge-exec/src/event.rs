//! Execution event taxonomy and the publish/subscribe bus.
//!
//! Each event type is a tagged variant; subscribers register per variant
//! (or for everything). Every rejected/cancelled/errored path in the
//! execution layer produces exactly one corresponding event.

use crate::positions::Discrepancy;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tradeforge_core::domain::{Order, Position};

/// Channel capacity per event kind. Slow subscribers lag rather than
/// block publishers.
const CHANNEL_CAPACITY: usize = 256;

/// Discriminant used for per-variant subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderSubmitted,
    OrderFilled,
    OrderPartiallyFilled,
    OrderCancelled,
    OrderRejected,
    OrderExpired,
    PositionOpened,
    PositionClosed,
    ExecutionError,
    ReconciliationComplete,
}

impl EventKind {
    const ALL: [EventKind; 10] = [
        EventKind::OrderSubmitted,
        EventKind::OrderFilled,
        EventKind::OrderPartiallyFilled,
        EventKind::OrderCancelled,
        EventKind::OrderRejected,
        EventKind::OrderExpired,
        EventKind::PositionOpened,
        EventKind::PositionClosed,
        EventKind::ExecutionError,
        EventKind::ReconciliationComplete,
    ];
}

/// Severity attached to `ExecutionError` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning,
    Error,
}

/// An execution-layer event.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    OrderSubmitted { order: Order },
    OrderFilled { order: Order },
    OrderPartiallyFilled { order: Order },
    OrderCancelled { order: Order },
    OrderRejected { order: Order, reason: String },
    OrderExpired { order: Order },
    PositionOpened { position: Position },
    PositionClosed { symbol: String, realized_pnl: f64 },
    ExecutionError {
        severity: ErrorSeverity,
        context: String,
        message: String,
    },
    ReconciliationComplete { discrepancies: Vec<Discrepancy> },
}

impl ExecutionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::OrderSubmitted { .. } => EventKind::OrderSubmitted,
            ExecutionEvent::OrderFilled { .. } => EventKind::OrderFilled,
            ExecutionEvent::OrderPartiallyFilled { .. } => EventKind::OrderPartiallyFilled,
            ExecutionEvent::OrderCancelled { .. } => EventKind::OrderCancelled,
            ExecutionEvent::OrderRejected { .. } => EventKind::OrderRejected,
            ExecutionEvent::OrderExpired { .. } => EventKind::OrderExpired,
            ExecutionEvent::PositionOpened { .. } => EventKind::PositionOpened,
            ExecutionEvent::PositionClosed { .. } => EventKind::PositionClosed,
            ExecutionEvent::ExecutionError { .. } => EventKind::ExecutionError,
            ExecutionEvent::ReconciliationComplete { .. } => EventKind::ReconciliationComplete,
        }
    }
}

/// Per-variant publish/subscribe bus.
///
/// One broadcast channel per event kind plus a firehose channel. Senders
/// are created up front, so publishing never allocates or locks.
#[derive(Debug)]
pub struct EventBus {
    by_kind: HashMap<EventKind, broadcast::Sender<ExecutionEvent>>,
    all: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let by_kind = EventKind::ALL
            .iter()
            .map(|&kind| (kind, broadcast::channel(CHANNEL_CAPACITY).0))
            .collect();
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { by_kind, all }
    }

    /// Subscribe to one event kind.
    pub fn subscribe(&self, kind: EventKind) -> broadcast::Receiver<ExecutionEvent> {
        self.by_kind
            .get(&kind)
            .expect("all kinds registered at construction")
            .subscribe()
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.all.subscribe()
    }

    /// Publish an event to its kind channel and the firehose.
    ///
    /// A send with no subscribers is not an error.
    pub fn publish(&self, event: ExecutionEvent) {
        let kind = event.kind();
        if let Some(sender) = self.by_kind.get(&kind) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
