//! Bar — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bar aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Minute,
    FiveMinute,
    Hour,
    Day,
}

/// OHLCV bar for a single symbol over one timeframe interval.
///
/// Bars are immutable once produced. Per-instrument sequences are ordered
/// ascending by timestamp with no duplicates; `data::BarSeries` enforces
/// this at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Basic OHLC sanity check: high is the max, low is the min, prices positive.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
    }

    /// Intrabar range as a fraction of the close. Used by the slippage model
    /// for volatility scaling.
    pub fn range_fraction(&self) -> f64 {
        if self.close <= 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.close
    }
}
