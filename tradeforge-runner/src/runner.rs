//! Backtest runner — wires config, data, engine, and metrics into the
//! full result bundle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use tradeforge_core::backtest::{run_backtest, OpenPositionSnapshot, SkippedSignal};
use tradeforge_core::data::{DataError, MarketData};
use tradeforge_core::domain::{EquityPoint, Strategy, Trade};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::metrics::{metrics_by_regime, monthly_returns, PerformanceMetrics};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("symbol '{0}' not present in loaded data")]
    SymbolNotFound(String),
}

/// Complete result of a single backtest run.
///
/// Everything a reporting layer needs: the config echo and its run id,
/// the trade list, the open-position snapshot from before the forced
/// close, the equity curve, metrics overall and per regime, and the
/// month-keyed return map.
#[derive(Debug, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: RunId,
    pub config: RunConfig,
    pub trades: Vec<Trade>,
    pub open_positions: Vec<OpenPositionSnapshot>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    /// Keyed by regime label ("trending", "mean_reverting", ...).
    pub regime_metrics: BTreeMap<String, PerformanceMetrics>,
    /// Keyed by "YYYY-MM".
    pub monthly_returns: BTreeMap<String, f64>,
    pub skipped_signals: Vec<SkippedSignal>,
    pub final_equity: f64,
    pub bar_count: usize,
    pub warmup_bars: usize,
}

/// Run a backtest: validate, replay, and assemble the report.
///
/// `data` must contain a series for every configured symbol; market data
/// acquisition itself lives outside this system.
pub fn run(
    config: &RunConfig,
    data: &MarketData,
    strategy: &mut dyn Strategy,
) -> Result<BacktestReport, RunError> {
    config.validate()?;
    for symbol in &config.symbols {
        if data.series(symbol).is_none() {
            return Err(RunError::SymbolNotFound(symbol.clone()));
        }
    }

    let engine_config = config.to_backtest_config();
    let output = run_backtest(data, strategy, &engine_config);

    info!(
        bars = output.bar_count,
        trades = output.trades.len(),
        skipped = output.skipped_signals.len(),
        final_equity = output.final_equity,
        "backtest complete"
    );

    let metrics = PerformanceMetrics::compute(
        &output.trades,
        &output.equity_curve,
        config.initial_capital,
    );
    let regime_metrics = metrics_by_regime(
        &output.trades,
        &output.equity_curve,
        config.initial_capital,
    )
    .into_iter()
    .map(|(regime, m)| (regime.to_string(), m))
    .collect();

    Ok(BacktestReport {
        run_id: config.run_id(),
        config: config.clone(),
        monthly_returns: monthly_returns(&output.equity_curve),
        trades: output.trades,
        open_positions: output.open_positions,
        metrics,
        regime_metrics,
        skipped_signals: output.skipped_signals,
        final_equity: output.final_equity,
        bar_count: output.bar_count,
        warmup_bars: output.warmup_bars,
        equity_curve: output.equity_curve,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use tradeforge_core::domain::{Bar, PositionSide, Signal, Timeframe};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap()
    }

    fn bars(closes: &[f64]) -> MarketData {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                symbol: "SPY".into(),
                timestamp: ts(i as u32 + 2),
                timeframe: Timeframe::Day,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect();
        let mut by_symbol = HashMap::new();
        by_symbol.insert("SPY".to_string(), bars);
        MarketData::from_bars(by_symbol).unwrap()
    }

    struct BuyOnce;
    impl Strategy for BuyOnce {
        fn on_bar(
            &mut self,
            timestamp: DateTime<Utc>,
            visible: &HashMap<String, Bar>,
        ) -> Vec<Signal> {
            if timestamp == ts(2) {
                let close = visible["SPY"].close;
                vec![
                    Signal::entry("SPY", PositionSide::Long, close, None, timestamp)
                        .with_quantity(100.0),
                ]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn report_carries_config_echo_and_run_id() {
        let config = RunConfig::new(vec!["SPY".to_string()], 100_000.0);
        let data = bars(&[100.0, 105.0, 110.0]);
        let report = run(&config, &data, &mut BuyOnce).unwrap();

        assert_eq!(report.run_id, config.run_id());
        assert_eq!(report.config.symbols, vec!["SPY"]);
        assert_eq!(report.bar_count, 3);
        assert_eq!(report.trades.len(), 1);
        assert!((report.final_equity - 101_000.0).abs() < 1e-9);
        assert!(report.metrics.total_return > 0.0);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let config = RunConfig::new(vec!["QQQ".to_string()], 100_000.0);
        let data = bars(&[100.0, 101.0]);
        assert!(matches!(
            run(&config, &data, &mut BuyOnce),
            Err(RunError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn report_serializes_to_json() {
        let config = RunConfig::new(vec!["SPY".to_string()], 100_000.0);
        let data = bars(&[100.0, 102.0, 104.0]);
        let report = run(&config, &data, &mut BuyOnce).unwrap();

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("run_id"));
        assert!(json.contains("monthly_returns"));
    }

    #[test]
    fn silent_strategy_yields_zeroed_metrics() {
        struct Silent;
        impl Strategy for Silent {
            fn on_bar(&mut self, _: DateTime<Utc>, _: &HashMap<String, Bar>) -> Vec<Signal> {
                Vec::new()
            }
        }

        let config = RunConfig::new(vec!["SPY".to_string()], 100_000.0);
        let data = bars(&[100.0, 102.0, 104.0]);
        let report = run(&config, &data, &mut Silent).unwrap();

        assert!(report.trades.is_empty());
        assert_eq!(report.metrics.trade_count, 0);
        assert_eq!(report.metrics.sharpe, 0.0);
        assert!(report.regime_metrics.is_empty());
    }
}
