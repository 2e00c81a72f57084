use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point of the equity curve, appended per processed bar timestamp.
///
/// Invariant: `drawdown == max(0, running_peak − equity)`, so it is never
/// negative; `drawdown_pct` is the same as a fraction of the peak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
    pub open_positions: usize,
    /// Return since the previous point; 0.0 on the first point.
    pub period_return: f64,
}

impl EquityPoint {
    /// Build the next point from the running peak and prior equity.
    pub fn next(
        timestamp: DateTime<Utc>,
        equity: f64,
        peak: f64,
        prev_equity: Option<f64>,
        open_positions: usize,
    ) -> Self {
        let drawdown = (peak - equity).max(0.0);
        let drawdown_pct = if peak > 0.0 { drawdown / peak } else { 0.0 };
        let period_return = match prev_equity {
            Some(prev) if prev > 0.0 => (equity - prev) / prev,
            _ => 0.0,
        };
        Self {
            timestamp,
            equity,
            drawdown,
            drawdown_pct,
            open_positions,
            period_return,
        }
    }
}
