//! TradeForge Core — engine, domain types, replay loop, fill simulation.
//!
//! This crate contains the heart of the backtesting engine:
//! - Domain types (bars, orders, fills, positions, trades, equity points)
//! - Validated per-instrument market data series with a merged time axis
//! - Strategy signal types and the `Strategy` trait
//! - Slippage and commission models
//! - The deterministic bar-by-bar replay loop with intrabar stop simulation

pub mod backtest;
pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core domain types are Send + Sync.
    ///
    /// The execution layer moves these across tokio tasks; if any type
    /// fails this check, the build breaks here instead of there.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::EquityPoint>();
        require_sync::<domain::EquityPoint>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
    }
}
