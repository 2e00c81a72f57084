//! Market data — validated per-instrument bar series and the merged time axis.

pub mod series;

pub use series::{BarSeries, DataError, MarketData};
