use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Order ID — process-local, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fill ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FillId(pub u64);

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-assigned execution identifier (opaque string, e.g. "SIM-17").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe ID generator.
///
/// The replay loop runs single-threaded, but the execution layer mints
/// order ids from concurrent tasks, so the counters are atomic.
#[derive(Debug, Default)]
pub struct IdGen {
    next_order: AtomicU64,
    next_fill: AtomicU64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn next_fill_id(&self) -> FillId {
        FillId(self.next_fill.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_gen_is_monotonic() {
        let gen = IdGen::new();
        let a = gen.next_order_id();
        let b = gen.next_order_id();
        assert_eq!(a, OrderId(1));
        assert_eq!(b, OrderId(2));
    }

    #[test]
    fn order_and_fill_counters_are_independent() {
        let gen = IdGen::new();
        gen.next_order_id();
        gen.next_order_id();
        assert_eq!(gen.next_fill_id(), FillId(1));
    }

    #[test]
    fn id_display() {
        assert_eq!(OrderId(42).to_string(), "42");
        assert_eq!(ExecutionId::new("SIM-7").to_string(), "SIM-7");
    }
}
