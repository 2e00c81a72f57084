//! CSV bar ingestion.
//!
//! One CSV file per symbol, daily bars, columns:
//! `date,open,high,low,close,volume` with `date` as YYYY-MM-DD.
//! Ordering and price sanity are enforced by `BarSeries` at load time;
//! a malformed file fails the whole load.

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tradeforge_core::data::{DataError, MarketData};
use tradeforge_core::domain::{Bar, Timeframe};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no CSV files found in {0}")]
    EmptyDirectory(String),
}

/// CSV row shape.
#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// UTC timestamp for a daily bar: the 21:00 UTC session close.
fn daily_timestamp(date: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(21, 0, 0).expect("valid time"))
}

/// Load one symbol's bars from a CSV file.
pub fn load_csv_file(path: &Path, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|source| LoadError::Csv {
        path: display.clone(),
        source,
    })?;

    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvBar>() {
        let row = row.map_err(|source| LoadError::Csv {
            path: display.clone(),
            source,
        })?;
        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp: daily_timestamp(row.date),
            timeframe: Timeframe::Day,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(bars)
}

/// Load `<symbol>.csv` for each requested symbol from a directory and
/// assemble validated `MarketData`.
pub fn load_csv_dir(dir: &Path, symbols: &[String]) -> Result<MarketData, LoadError> {
    let mut by_symbol: HashMap<String, Vec<Bar>> = HashMap::new();
    for symbol in symbols {
        let path = dir.join(format!("{symbol}.csv"));
        if !path.exists() {
            return Err(LoadError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        by_symbol.insert(symbol.clone(), load_csv_file(&path, symbol)?);
    }
    if by_symbol.is_empty() {
        return Err(LoadError::EmptyDirectory(dir.display().to_string()));
    }
    Ok(MarketData::from_bars(by_symbol)?)
}
