//! Per-instrument bar series with load-time validation, and the
//! multi-symbol container the replay loop iterates over.
//!
//! Malformed ordering (non-ascending or duplicate timestamps) and
//! non-positive prices are fatal preconditions caught here, never during
//! replay.

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Fatal data validation errors.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{symbol}: empty bar series")]
    EmptySeries { symbol: String },

    #[error("{symbol}: non-ascending timestamp at index {index} ({timestamp})")]
    NonAscendingTimestamps {
        symbol: String,
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("{symbol}: duplicate timestamp at index {index} ({timestamp})")]
    DuplicateTimestamp {
        symbol: String,
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("{symbol}: insane bar at index {index} (non-positive price or inverted high/low)")]
    InsaneBar { symbol: String, index: usize },

    #[error("{symbol}: bar symbol '{found}' does not match series symbol")]
    SymbolMismatch { symbol: String, found: String },

    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
}

/// An ordered, validated bar sequence for one instrument.
#[derive(Debug, Clone)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validate and take ownership of a bar sequence.
    ///
    /// Checks: non-empty, strictly ascending timestamps (duplicates are a
    /// distinct error), OHLC sanity, consistent symbol.
    pub fn from_bars(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(DataError::EmptySeries { symbol });
        }
        for (index, bar) in bars.iter().enumerate() {
            if bar.symbol != symbol {
                return Err(DataError::SymbolMismatch {
                    symbol,
                    found: bar.symbol.clone(),
                });
            }
            if !bar.is_sane() {
                return Err(DataError::InsaneBar { symbol, index });
            }
            if index > 0 {
                let prev = bars[index - 1].timestamp;
                if bar.timestamp == prev {
                    return Err(DataError::DuplicateTimestamp {
                        symbol,
                        index,
                        timestamp: bar.timestamp,
                    });
                }
                if bar.timestamp < prev {
                    return Err(DataError::NonAscendingTimestamps {
                        symbol,
                        index,
                        timestamp: bar.timestamp,
                    });
                }
            }
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The latest bar at or before `timestamp`, if any.
    pub fn latest_at(&self, timestamp: DateTime<Utc>) -> Option<&Bar> {
        match self
            .bars
            .binary_search_by_key(&timestamp, |b| b.timestamp)
        {
            Ok(i) => Some(&self.bars[i]),
            Err(0) => None,
            Err(i) => Some(&self.bars[i - 1]),
        }
    }

    /// The bar exactly at `timestamp`, if one exists.
    pub fn at(&self, timestamp: DateTime<Utc>) -> Option<&Bar> {
        self.bars
            .binary_search_by_key(&timestamp, |b| b.timestamp)
            .ok()
            .map(|i| &self.bars[i])
    }

    pub fn last(&self) -> &Bar {
        // Non-empty by construction.
        self.bars.last().expect("BarSeries is never empty")
    }
}

/// Multi-instrument market data: validated series keyed by symbol plus
/// the merged, globally sorted, deduplicated timestamp axis the replay
/// loop iterates over.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    series: HashMap<String, BarSeries>,
    timestamps: Vec<DateTime<Utc>>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw per-symbol bar vectors, validating each series.
    pub fn from_bars(bars_by_symbol: HashMap<String, Vec<Bar>>) -> Result<Self, DataError> {
        let mut data = Self::new();
        for (symbol, bars) in bars_by_symbol {
            data.insert_series(BarSeries::from_bars(symbol, bars)?);
        }
        Ok(data)
    }

    pub fn insert_series(&mut self, series: BarSeries) {
        self.series.insert(series.symbol().to_string(), series);
        self.rebuild_axis();
    }

    fn rebuild_axis(&mut self) {
        let merged: BTreeSet<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|s| s.bars().iter().map(|b| b.timestamp))
            .collect();
        self.timestamps = merged.into_iter().collect();
    }

    /// The merged timestamp axis, ascending, deduplicated.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.series.keys().map(|s| s.as_str()).collect()
    }

    pub fn series(&self, symbol: &str) -> Option<&BarSeries> {
        self.series.get(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Latest available bar per symbol at `timestamp` (carry-forward for
    /// symbols without a bar exactly at this instant).
    pub fn bars_at(&self, timestamp: DateTime<Utc>) -> HashMap<String, Bar> {
        self.series
            .iter()
            .filter_map(|(symbol, series)| {
                series
                    .latest_at(timestamp)
                    .map(|bar| (symbol.clone(), bar.clone()))
            })
            .collect()
    }

    /// The §6 "current price" query: last close at or before `timestamp`.
    pub fn price_at(&self, symbol: &str, timestamp: DateTime<Utc>) -> Result<f64, DataError> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))?;
        series
            .latest_at(timestamp)
            .map(|b| b.close)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))
    }

    /// Last close of the whole series for a symbol.
    pub fn final_price(&self, symbol: &str) -> Result<f64, DataError> {
        self.series
            .get(symbol)
            .map(|s| s.last().close)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::TimeZone;

    fn bar(symbol: &str, day: u32, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap(),
            timeframe: Timeframe::Day,
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn valid_series_accepted() {
        let series =
            BarSeries::from_bars("SPY", vec![bar("SPY", 2, 100.0), bar("SPY", 3, 101.0)]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol(), "SPY");
    }

    #[test]
    fn empty_series_rejected() {
        assert!(matches!(
            BarSeries::from_bars("SPY", vec![]),
            Err(DataError::EmptySeries { .. })
        ));
    }

    #[test]
    fn non_ascending_timestamps_rejected() {
        let result = BarSeries::from_bars("SPY", vec![bar("SPY", 3, 100.0), bar("SPY", 2, 99.0)]);
        assert!(matches!(
            result,
            Err(DataError::NonAscendingTimestamps { index: 1, .. })
        ));
    }

    #[test]
    fn duplicate_timestamps_rejected() {
        let result = BarSeries::from_bars("SPY", vec![bar("SPY", 2, 100.0), bar("SPY", 2, 101.0)]);
        assert!(matches!(
            result,
            Err(DataError::DuplicateTimestamp { index: 1, .. })
        ));
    }

    #[test]
    fn non_positive_price_rejected() {
        let mut bad = bar("SPY", 2, 100.0);
        bad.low = -1.0;
        let result = BarSeries::from_bars("SPY", vec![bad]);
        assert!(matches!(result, Err(DataError::InsaneBar { index: 0, .. })));
    }

    #[test]
    fn symbol_mismatch_rejected() {
        let result = BarSeries::from_bars("SPY", vec![bar("QQQ", 2, 100.0)]);
        assert!(matches!(result, Err(DataError::SymbolMismatch { .. })));
    }

    #[test]
    fn latest_at_carries_forward() {
        let series =
            BarSeries::from_bars("SPY", vec![bar("SPY", 2, 100.0), bar("SPY", 5, 103.0)]).unwrap();
        let between = Utc.with_ymd_and_hms(2024, 1, 3, 21, 0, 0).unwrap();
        assert_eq!(series.latest_at(between).unwrap().close, 100.0);

        let before = Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap();
        assert!(series.latest_at(before).is_none());
    }

    #[test]
    fn merged_axis_is_sorted_and_deduplicated() {
        let mut by_symbol = HashMap::new();
        by_symbol.insert(
            "SPY".to_string(),
            vec![bar("SPY", 2, 100.0), bar("SPY", 3, 101.0)],
        );
        by_symbol.insert(
            "QQQ".to_string(),
            vec![bar("QQQ", 3, 400.0), bar("QQQ", 4, 401.0)],
        );
        let data = MarketData::from_bars(by_symbol).unwrap();

        // Union of {2,3} and {3,4} = {2,3,4}
        assert_eq!(data.timestamps().len(), 3);
        assert!(data.timestamps().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn bars_at_returns_latest_per_symbol() {
        let mut by_symbol = HashMap::new();
        by_symbol.insert(
            "SPY".to_string(),
            vec![bar("SPY", 2, 100.0), bar("SPY", 3, 101.0)],
        );
        by_symbol.insert("QQQ".to_string(), vec![bar("QQQ", 3, 400.0)]);
        let data = MarketData::from_bars(by_symbol).unwrap();

        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let at_t2 = data.bars_at(t2);
        assert_eq!(at_t2.len(), 1); // QQQ has nothing yet
        assert_eq!(at_t2["SPY"].close, 100.0);

        let t3 = Utc.with_ymd_and_hms(2024, 1, 3, 21, 0, 0).unwrap();
        let at_t3 = data.bars_at(t3);
        assert_eq!(at_t3.len(), 2);
        assert_eq!(at_t3["QQQ"].close, 400.0);
    }

    #[test]
    fn price_query_unknown_symbol_errors() {
        let data = MarketData::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        assert!(matches!(
            data.price_at("SPY", t),
            Err(DataError::UnknownSymbol(_))
        ));
    }
}
