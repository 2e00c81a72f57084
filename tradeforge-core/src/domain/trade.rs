//! Trade — a completed round trip recorded by the backtester.

use super::position::PositionSide;
use super::regime::Regime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The strategy emitted an exit signal.
    Signal,
    /// The protective stop was pierced intrabar.
    StopLoss,
    /// Forced close when the replay window ended.
    EndOfBacktest,
}

/// A complete round-trip trade record: entry → exit.
///
/// Created when an entry fill is simulated, finalized exactly once at the
/// exit fill. Immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: PositionSide,

    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,

    pub quantity: f64,
    /// Dollar amount at risk at entry: |entry − initial stop| × quantity.
    /// 0.0 when the entry carried no stop.
    pub risk_amount: f64,
    pub regime: Regime,

    pub slippage: f64,
    pub commission: f64,
    /// Net of slippage and commission.
    pub pnl: f64,
    pub exit_reason: ExitReason,

    /// Maximum adverse excursion (worst open P&L observed), ≤ 0.
    pub mae: f64,
    /// Maximum favorable excursion (best open P&L observed), ≥ 0.
    pub mfe: f64,
}

impl Trade {
    /// Realized P&L divided by the amount initially risked.
    /// 0.0 when no risk amount was recorded.
    pub fn r_multiple(&self) -> f64 {
        if self.risk_amount.abs() < f64::EPSILON {
            return 0.0;
        }
        self.pnl / self.risk_amount
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Return on entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional.abs() < f64::EPSILON {
            return 0.0;
        }
        self.pnl / notional
    }
}
