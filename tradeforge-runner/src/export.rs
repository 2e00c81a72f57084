//! CSV export of run artifacts: trade tape and equity curve.

use std::path::Path;
use thiserror::Error;
use tradeforge_core::domain::{EquityPoint, Trade};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Write the trade tape as CSV, one row per round trip.
pub fn write_trades_csv(trades: &[Trade], path: &Path) -> Result<(), ExportError> {
    let display = path.display().to_string();
    let wrap = |source| ExportError::Csv {
        path: display.clone(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
    writer
        .write_record([
            "symbol",
            "side",
            "entry_time",
            "entry_price",
            "exit_time",
            "exit_price",
            "quantity",
            "pnl",
            "r_multiple",
            "regime",
            "exit_reason",
            "mae",
            "mfe",
        ])
        .map_err(wrap)?;

    for trade in trades {
        writer
            .write_record([
                trade.symbol.clone(),
                format!("{:?}", trade.side).to_lowercase(),
                trade.entry_time.to_rfc3339(),
                format!("{:.4}", trade.entry_price),
                trade.exit_time.to_rfc3339(),
                format!("{:.4}", trade.exit_price),
                format!("{}", trade.quantity),
                format!("{:.2}", trade.pnl),
                format!("{:.3}", trade.r_multiple()),
                trade.regime.to_string(),
                format!("{:?}", trade.exit_reason),
                format!("{:.2}", trade.mae),
                format!("{:.2}", trade.mfe),
            ])
            .map_err(wrap)?;
    }
    writer.flush().map_err(|e| ExportError::Csv {
        path: display.clone(),
        source: e.into(),
    })?;
    Ok(())
}

/// Write the equity curve as CSV, one row per bar timestamp.
pub fn write_equity_csv(equity_curve: &[EquityPoint], path: &Path) -> Result<(), ExportError> {
    let display = path.display().to_string();
    let wrap = |source| ExportError::Csv {
        path: display.clone(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
    writer
        .write_record([
            "timestamp",
            "equity",
            "drawdown",
            "drawdown_pct",
            "open_positions",
            "period_return",
        ])
        .map_err(wrap)?;

    for point in equity_curve {
        writer
            .write_record([
                point.timestamp.to_rfc3339(),
                format!("{:.2}", point.equity),
                format!("{:.2}", point.drawdown),
                format!("{:.6}", point.drawdown_pct),
                point.open_positions.to_string(),
                format!("{:.8}", point.period_return),
            ])
            .map_err(wrap)?;
    }
    writer.flush().map_err(|e| ExportError::Csv {
        path: display.clone(),
        source: e.into(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tradeforge_core::domain::{ExitReason, PositionSide, Regime};

    fn sample_trade() -> Trade {
        let entry = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        Trade {
            symbol: "SPY".into(),
            side: PositionSide::Long,
            entry_time: entry,
            entry_price: 100.0,
            exit_time: entry + chrono::Duration::days(3),
            exit_price: 105.0,
            quantity: 10.0,
            risk_amount: 50.0,
            regime: Regime::Trending,
            slippage: 0.0,
            commission: 1.0,
            pnl: 49.0,
            exit_reason: ExitReason::Signal,
            mae: -10.0,
            mfe: 60.0,
        }
    }

    #[test]
    fn trades_csv_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        write_trades_csv(&[sample_trade()], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("symbol,side,entry_time"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("SPY,long,"));
        assert!(row.contains("trending"));
    }

    #[test]
    fn equity_csv_has_one_row_per_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equity.csv");
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let points = vec![
            EquityPoint::next(t, 100_000.0, 100_000.0, None, 0),
            EquityPoint::next(
                t + chrono::Duration::days(1),
                101_000.0,
                101_000.0,
                Some(100_000.0),
                1,
            ),
        ];
        write_equity_csv(&points, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3); // header + 2 rows
    }
}
