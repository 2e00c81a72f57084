//! Serializable run configuration.

use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tradeforge_core::backtest::{BacktestConfig, CommissionModel, SlippageModel};

/// Content-addressable identifier for a run configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("initial_capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("position_size_pct must be in (0, 1], got {0}")]
    BadPositionSize(f64),

    #[error("start_date {0} is after end_date {1}")]
    InvertedWindow(NaiveDate, NaiveDate),

    #[error("config names no symbols")]
    NoSymbols,
}

/// Serializable configuration for a single backtest run.
///
/// Captures everything needed to reproduce the run: universe, window,
/// capital, sizing, cost models, and feature toggles. Two identical
/// configs hash to the same `RunId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbols: Vec<String>,
    pub initial_capital: f64,

    /// Inclusive window, whole calendar days. None = unbounded.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub warmup_bars: usize,
    #[serde(default = "default_position_size")]
    pub position_size_pct: f64,
    #[serde(default = "default_true")]
    pub intrabar_stops: bool,

    #[serde(default)]
    pub slippage: SlippageModel,
    #[serde(default)]
    pub commission: CommissionModel,
}

fn default_position_size() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    pub fn new(symbols: Vec<String>, initial_capital: f64) -> Self {
        Self {
            symbols,
            initial_capital,
            start_date: None,
            end_date: None,
            warmup_bars: 0,
            position_size_pct: 1.0,
            intrabar_stops: true,
            slippage: SlippageModel::frictionless(),
            commission: CommissionModel::None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.position_size_pct <= 0.0 || self.position_size_pct > 1.0 {
            return Err(ConfigError::BadPositionSize(self.position_size_pct));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ConfigError::InvertedWindow(start, end));
            }
        }
        Ok(())
    }

    /// Deterministic hash ID of this configuration.
    ///
    /// Two runs with identical configs share a `RunId`, which makes result
    /// artifacts content-addressable.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization is infallible");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Translate into the engine's config. Dates widen to whole UTC days.
    pub fn to_backtest_config(&self) -> BacktestConfig {
        let mut config = BacktestConfig::new(self.initial_capital);
        config.start = self
            .start_date
            .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).expect("midnight is valid")));
        config.end = self
            .end_date
            .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(23, 59, 59).expect("valid time")));
        config.warmup_bars = self.warmup_bars;
        config.position_size_pct = self.position_size_pct;
        config.intrabar_stops = self.intrabar_stops;
        config.slippage = self.slippage.clone();
        config.commission = self.commission.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
symbols = ["SPY", "QQQ"]
initial_capital = 100000.0
start_date = "2024-01-02"
end_date = "2024-12-31"
warmup_bars = 20

[slippage]
base_bps = 5.0
vol_scale = 1.0
max_bps = 25.0

[commission]
type = "percent_notional"
rate = 0.0005
"#;

    #[test]
    fn parses_full_toml() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.symbols, vec!["SPY", "QQQ"]);
        assert_eq!(config.warmup_bars, 20);
        assert_eq!(config.slippage.base_bps, 5.0);
        assert_eq!(
            config.commission,
            CommissionModel::PercentNotional { rate: 0.0005 }
        );
        // Defaults applied
        assert!(config.intrabar_stops);
        assert_eq!(config.position_size_pct, 1.0);
    }

    #[test]
    fn run_id_is_deterministic() {
        let a = RunConfig::from_toml_str(SAMPLE).unwrap();
        let b = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(a.run_id(), b.run_id());
    }

    #[test]
    fn run_id_changes_with_config() {
        let a = RunConfig::from_toml_str(SAMPLE).unwrap();
        let mut b = a.clone();
        b.initial_capital = 200_000.0;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn rejects_empty_universe() {
        let result = RunConfig::from_toml_str("symbols = []\ninitial_capital = 1000.0");
        assert!(matches!(result, Err(ConfigError::NoSymbols)));
    }

    #[test]
    fn rejects_non_positive_capital() {
        let result = RunConfig::from_toml_str("symbols = [\"SPY\"]\ninitial_capital = 0.0");
        assert!(matches!(result, Err(ConfigError::NonPositiveCapital(_))));
    }

    #[test]
    fn rejects_inverted_window() {
        let raw = r#"
symbols = ["SPY"]
initial_capital = 1000.0
start_date = "2024-06-01"
end_date = "2024-01-01"
"#;
        assert!(matches!(
            RunConfig::from_toml_str(raw),
            Err(ConfigError::InvertedWindow(_, _))
        ));
    }

    #[test]
    fn to_backtest_config_widens_window_to_full_days() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        let bt = config.to_backtest_config();
        let start = bt.start.unwrap();
        let end = bt.end.unwrap();
        assert_eq!(start.format("%H:%M:%S").to_string(), "00:00:00");
        assert_eq!(end.format("%H:%M:%S").to_string(), "23:59:59");
        assert!(start < end);
    }
}
