//! Backtest run configuration.

use super::commission::CommissionModel;
use super::slippage::SlippageModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for a single backtest run. Everything is passed in;
/// nothing is hard-coded in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Inclusive start of the replay window. None = from the first bar.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end of the replay window. None = to the last bar.
    pub end: Option<DateTime<Utc>>,
    /// Number of leading timestamps during which data is fed to the
    /// strategy but signal execution is suppressed.
    pub warmup_bars: usize,
    /// Fraction of current equity allocated to an entry when the signal
    /// carries no explicit quantity.
    pub position_size_pct: f64,
    /// Simulate protective stops against each bar's high/low.
    pub intrabar_stops: bool,
    pub slippage: SlippageModel,
    pub commission: CommissionModel,
}

impl BacktestConfig {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            start: None,
            end: None,
            warmup_bars: 0,
            position_size_pct: 1.0,
            intrabar_stops: true,
            slippage: SlippageModel::frictionless(),
            commission: CommissionModel::None,
        }
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_warmup(mut self, bars: usize) -> Self {
        self.warmup_bars = bars;
        self
    }

    pub fn with_costs(mut self, slippage: SlippageModel, commission: CommissionModel) -> Self {
        self.slippage = slippage;
        self.commission = commission;
        self
    }

    /// Whether `timestamp` falls inside the configured replay window.
    pub fn in_window(&self, timestamp: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if timestamp > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults() {
        let config = BacktestConfig::new(100_000.0);
        assert_eq!(config.initial_capital, 100_000.0);
        assert_eq!(config.warmup_bars, 0);
        assert!(config.intrabar_stops);
        assert_eq!(config.position_size_pct, 1.0);
    }

    #[test]
    fn window_filtering() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let config = BacktestConfig::new(100_000.0).with_window(start, end);

        assert!(config.in_window(start));
        assert!(config.in_window(end));
        assert!(!config.in_window(start - chrono::Duration::days(1)));
        assert!(!config.in_window(end + chrono::Duration::days(1)));
    }

    #[test]
    fn open_window_accepts_everything() {
        let config = BacktestConfig::new(100_000.0);
        let t = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        assert!(config.in_window(t));
    }
}
