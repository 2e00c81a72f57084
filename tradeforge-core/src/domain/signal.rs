//! Strategy signal stream — the consumed interface to the signal source.

use super::bar::Bar;
use super::position::PositionSide;
use super::regime::Regime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the strategy wants done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    /// Open a position; `initial_stop` arms the protective stop if present.
    Entry { initial_stop: Option<f64> },
    /// Close the position for this symbol in full.
    Exit,
    /// Move the protective stop to a new level. Callers are expected to
    /// ratchet (tighten-only); the backtester clamps widening attempts.
    StopAdjustment { stop: f64 },
}

/// A discrete strategy event: entry, exit, or stop adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: PositionSide,
    pub kind: SignalKind,
    /// Reference price at signal time (typically the bar close).
    pub price: f64,
    /// Requested size. None lets the engine size from configured equity fraction.
    pub quantity: Option<f64>,
    /// Market regime at signal time; stamped onto the trade at entry.
    pub regime: Regime,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn entry(
        symbol: impl Into<String>,
        direction: PositionSide,
        price: f64,
        initial_stop: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            kind: SignalKind::Entry { initial_stop },
            price,
            quantity: None,
            regime: Regime::Unknown,
            timestamp,
        }
    }

    pub fn exit(
        symbol: impl Into<String>,
        direction: PositionSide,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            kind: SignalKind::Exit,
            price,
            quantity: None,
            regime: Regime::Unknown,
            timestamp,
        }
    }

    pub fn stop_adjustment(
        symbol: impl Into<String>,
        direction: PositionSide,
        stop: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            kind: SignalKind::StopAdjustment { stop },
            price: stop,
            quantity: None,
            regime: Regime::Unknown,
            timestamp,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.regime = regime;
        self
    }
}

/// A trading strategy, driven bar-by-bar by the backtester.
///
/// `bars` holds the latest available bar per symbol at the current
/// timestamp. Implementations are external to this crate; tests and the
/// CLI supply small concrete ones.
pub trait Strategy {
    fn on_bar(&mut self, timestamp: DateTime<Utc>, bars: &HashMap<String, Bar>) -> Vec<Signal>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_signal_builder() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let signal = Signal::entry("SPY", PositionSide::Long, 470.0, Some(460.0), ts)
            .with_quantity(100.0)
            .with_regime(Regime::Trending);
        assert_eq!(
            signal.kind,
            SignalKind::Entry {
                initial_stop: Some(460.0)
            }
        );
        assert_eq!(signal.quantity, Some(100.0));
        assert_eq!(signal.regime, Regime::Trending);
    }

    #[test]
    fn signal_serialization_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let signal = Signal::stop_adjustment("SPY", PositionSide::Long, 465.0, ts);
        let json = serde_json::to_string(&signal).unwrap();
        let deser: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(deser.kind, SignalKind::StopAdjustment { stop: 465.0 });
    }
}
