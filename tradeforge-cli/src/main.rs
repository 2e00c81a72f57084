//! TradeForge CLI — run backtests from TOML configs over CSV bar data.
//!
//! Commands:
//! - `run` — execute a backtest and write the report bundle
//! - `sample-config` — print a starter TOML config

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tradeforge_core::domain::{Bar, PositionSide, Regime, Signal, Strategy};
use tradeforge_runner::export::{write_equity_csv, write_trades_csv};
use tradeforge_runner::{data_loader, run, RunConfig};

#[derive(Parser)]
#[command(name = "tradeforge", about = "TradeForge — backtesting engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to the TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding `<SYMBOL>.csv` bar files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for the report JSON and CSV artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Fast moving-average period for the demo strategy.
        #[arg(long, default_value_t = 20)]
        fast: usize,

        /// Slow moving-average period for the demo strategy.
        #[arg(long, default_value_t = 50)]
        slow: usize,

        /// Protective stop distance as a fraction of entry price.
        #[arg(long, default_value_t = 0.05)]
        stop_pct: f64,
    },
    /// Print a starter TOML config to stdout.
    SampleConfig,
}

const SAMPLE_CONFIG: &str = r#"symbols = ["SPY"]
initial_capital = 100000.0
start_date = "2024-01-02"
end_date = "2024-12-31"
warmup_bars = 50
position_size_pct = 0.95
intrabar_stops = true

[slippage]
base_bps = 5.0
vol_scale = 1.0
max_bps = 25.0

[commission]
type = "percent_notional"
rate = 0.0005
"#;

/// Moving-average crossover demo strategy.
///
/// Golden cross enters long with a fixed-fraction protective stop; death
/// cross exits. Trades are tagged trending when the averages have
/// meaningfully separated, quiet otherwise.
struct SmaCross {
    fast: usize,
    slow: usize,
    stop_pct: f64,
    closes: HashMap<String, Vec<f64>>,
    last_seen: HashMap<String, DateTime<Utc>>,
    in_position: HashMap<String, bool>,
}

impl SmaCross {
    fn new(fast: usize, slow: usize, stop_pct: f64) -> Self {
        Self {
            fast,
            slow,
            stop_pct,
            closes: HashMap::new(),
            last_seen: HashMap::new(),
            in_position: HashMap::new(),
        }
    }

    fn sma(values: &[f64], period: usize) -> Option<f64> {
        if values.len() < period {
            return None;
        }
        Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
    }
}

impl Strategy for SmaCross {
    fn on_bar(&mut self, timestamp: DateTime<Utc>, bars: &HashMap<String, Bar>) -> Vec<Signal> {
        let mut signals = Vec::new();
        for (symbol, bar) in bars {
            // Skip carried-forward bars; only a fresh print advances the averages.
            if self.last_seen.get(symbol) == Some(&bar.timestamp) {
                continue;
            }
            self.last_seen.insert(symbol.clone(), bar.timestamp);

            let closes = self.closes.entry(symbol.clone()).or_default();
            closes.push(bar.close);

            let (Some(fast), Some(slow)) = (
                Self::sma(closes, self.fast),
                Self::sma(closes, self.slow),
            ) else {
                continue;
            };

            let holding = self.in_position.get(symbol).copied().unwrap_or(false);
            let regime = if (fast - slow).abs() / slow > 0.02 {
                Regime::Trending
            } else {
                Regime::Quiet
            };

            if fast > slow && !holding {
                let stop = bar.close * (1.0 - self.stop_pct);
                signals.push(
                    Signal::entry(symbol.clone(), PositionSide::Long, bar.close, Some(stop), timestamp)
                        .with_regime(regime),
                );
                self.in_position.insert(symbol.clone(), true);
            } else if fast < slow && holding {
                signals.push(Signal::exit(
                    symbol.clone(),
                    PositionSide::Long,
                    bar.close,
                    timestamp,
                ));
                self.in_position.insert(symbol.clone(), false);
            }
        }
        signals
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            data_dir,
            output_dir,
            fast,
            slow,
            stop_pct,
        } => run_command(config, data_dir, output_dir, fast, slow, stop_pct),
        Commands::SampleConfig => {
            print!("{SAMPLE_CONFIG}");
            Ok(())
        }
    }
}

fn run_command(
    config_path: PathBuf,
    data_dir: PathBuf,
    output_dir: PathBuf,
    fast: usize,
    slow: usize,
    stop_pct: f64,
) -> Result<()> {
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let data = data_loader::load_csv_dir(&data_dir, &config.symbols)
        .with_context(|| format!("loading bars from {}", data_dir.display()))?;

    let mut strategy = SmaCross::new(fast, slow, stop_pct);
    let report = run(&config, &data, &mut strategy).context("backtest failed")?;

    print_summary(&report);

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let report_path = output_dir.join(format!("{}.json", &report.run_id[..16]));
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", report_path.display()))?;
    write_trades_csv(&report.trades, &output_dir.join("trades.csv"))?;
    write_equity_csv(&report.equity_curve, &output_dir.join("equity.csv"))?;

    println!("\nreport written to {}", report_path.display());
    Ok(())
}

fn print_summary(report: &tradeforge_runner::BacktestReport) {
    let m = &report.metrics;
    println!("run {}", &report.run_id[..16]);
    println!("bars processed     {}", report.bar_count);
    println!("trades             {}", m.trade_count);
    println!("final equity       {:.2}", report.final_equity);
    println!("total return       {:.2} ({:.2}%)", m.total_return, m.total_return_pct * 100.0);
    println!("CAGR               {:.2}%", m.cagr * 100.0);
    println!("sharpe             {:.2}", m.sharpe);
    println!("sortino            {:.2}", m.sortino);
    println!("calmar             {:.2}", m.calmar);
    println!("max drawdown       {:.2} ({:.2}%)", m.max_drawdown, m.max_drawdown_pct * 100.0);
    println!("ulcer index        {:.4}", m.ulcer_index);
    println!("win rate           {:.1}%", m.win_rate * 100.0);
    println!("expectancy         {:.2}", m.expectancy);
    println!("profit factor      {:.2}", m.profit_factor);
    println!(
        "streaks            {} wins / {} losses",
        m.longest_win_streak, m.longest_loss_streak
    );
    println!(
        "95% CI on E[pnl]   [{:.2}, {:.2}]",
        m.ci95_low, m.ci95_high
    );

    if !report.regime_metrics.is_empty() {
        println!("\nper-regime:");
        for (regime, rm) in &report.regime_metrics {
            println!(
                "  {:<15} trades {:<4} win rate {:.1}%  expectancy {:.2}",
                regime,
                rm.trade_count,
                rm.win_rate * 100.0,
                rm.expectancy
            );
        }
    }

    if !report.monthly_returns.is_empty() {
        println!("\nmonthly returns:");
        for (month, ret) in &report.monthly_returns {
            println!("  {month}  {:+.2}%", ret * 100.0);
        }
    }

    if !report.skipped_signals.is_empty() {
        println!("\nskipped signals: {}", report.skipped_signals.len());
    }
}
