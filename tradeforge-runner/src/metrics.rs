//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function over the trade list and/or the equity
//! curve. No dependencies on the runner or the engine. Every ratio
//! defaults to 0.0 when its denominator is zero; an empty trade list
//! yields a fully zeroed metrics object, never NaN or a panic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tradeforge_core::domain::{EquityPoint, Regime, Trade};

/// Bars per calendar year used for annualization.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate performance and risk metrics for a single backtest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // ── Returns ──
    pub total_return: f64,
    pub total_return_pct: f64,
    pub cagr: f64,

    // ── Risk-adjusted ratios ──
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,

    // ── Drawdown ──
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub avg_drawdown_pct: f64,
    pub max_drawdown_duration_bars: usize,
    pub ulcer_index: f64,

    // ── Return distribution ──
    pub skewness: f64,
    pub kurtosis: f64,

    // ── Trade statistics ──
    pub trade_count: usize,
    pub win_rate: f64,
    pub expectancy: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,

    // ── Confidence ──
    /// 95% normal-approximation interval on expected trade P&L.
    pub ci95_low: f64,
    pub ci95_high: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and trade list.
    ///
    /// An empty trade list returns the zeroed default, per contract.
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let returns = period_returns(equity_curve);
        let (avg_dd, max_dd_duration) = drawdown_profile(equity_curve);
        let (ci95_low, ci95_high) = confidence_interval_95(trades);
        let cagr_value = cagr(equity_curve, initial_capital);

        Self {
            total_return: total_return(equity_curve, initial_capital),
            total_return_pct: total_return_pct(equity_curve, initial_capital),
            cagr: cagr_value,
            sharpe: sharpe_ratio(&returns),
            sortino: sortino_ratio(&returns),
            calmar: calmar_ratio(cagr_value, max_drawdown_pct(equity_curve)),
            max_drawdown: max_drawdown(equity_curve),
            max_drawdown_pct: max_drawdown_pct(equity_curve),
            avg_drawdown_pct: avg_dd,
            max_drawdown_duration_bars: max_dd_duration,
            ulcer_index: ulcer_index(equity_curve),
            skewness: skewness(&returns),
            kurtosis: kurtosis(&returns),
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            expectancy: expectancy(trades),
            profit_factor: profit_factor(trades),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            longest_win_streak: longest_streak(trades, true),
            longest_loss_streak: longest_streak(trades, false),
            ci95_low,
            ci95_high,
        }
    }
}

// ─── Equity-curve metrics ───────────────────────────────────────────

/// Absolute return in account currency.
pub fn total_return(equity_curve: &[EquityPoint], initial_capital: f64) -> f64 {
    match equity_curve.last() {
        Some(last) => last.equity - initial_capital,
        None => 0.0,
    }
}

/// Return as a fraction of initial capital.
pub fn total_return_pct(equity_curve: &[EquityPoint], initial_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    total_return(equity_curve, initial_capital) / initial_capital
}

/// Compound annual growth rate over the elapsed calendar time of the run.
///
/// Uses the equity curve's first/last timestamps for the elapsed years.
pub fn cagr(equity_curve: &[EquityPoint], initial_capital: f64) -> f64 {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if initial_capital <= 0.0 || last.equity <= 0.0 {
        return 0.0;
    }
    let days = (last.timestamp - first.timestamp).num_days() as f64;
    let years = days / 365.25;
    if years <= 0.0 {
        return 0.0;
    }
    (last.equity / initial_capital).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from per-bar returns (risk-free rate 0).
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio: downside deviation uses only the negative
/// return observations (squared, averaged over the full sample size).
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean / downside_std) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Calmar ratio: CAGR / |max drawdown fraction|.
pub fn calmar_ratio(cagr_value: f64, max_dd_pct: f64) -> f64 {
    if max_dd_pct <= 0.0 {
        return 0.0;
    }
    cagr_value / max_dd_pct
}

/// Maximum drawdown in account currency (≥ 0).
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    equity_curve
        .iter()
        .map(|p| p.drawdown)
        .fold(0.0, f64::max)
}

/// Maximum drawdown as a fraction of the running peak (≥ 0).
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    equity_curve
        .iter()
        .map(|p| p.drawdown_pct)
        .fold(0.0, f64::max)
}

/// Average drawdown fraction and the longest underwater stretch in bars.
pub fn drawdown_profile(equity_curve: &[EquityPoint]) -> (f64, usize) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }
    let avg = equity_curve.iter().map(|p| p.drawdown_pct).sum::<f64>()
        / equity_curve.len() as f64;

    let mut longest = 0usize;
    let mut current = 0usize;
    for point in equity_curve {
        if point.drawdown > 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    (avg, longest)
}

/// Ulcer Index: root-mean-square of the drawdown fraction.
pub fn ulcer_index(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    let mean_sq = equity_curve
        .iter()
        .map(|p| p.drawdown_pct * p.drawdown_pct)
        .sum::<f64>()
        / equity_curve.len() as f64;
    mean_sq.sqrt()
}

/// Standardized third moment of per-bar returns.
pub fn skewness(returns: &[f64]) -> f64 {
    standardized_moment(returns, 3)
}

/// Standardized fourth moment of per-bar returns (normal ≈ 3).
pub fn kurtosis(returns: &[f64]) -> f64 {
    standardized_moment(returns, 4)
}

fn standardized_moment(returns: &[f64], order: i32) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let n = returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    returns
        .iter()
        .map(|r| ((r - mean) / std).powi(order))
        .sum::<f64>()
        / n
}

// ─── Trade-list metrics ─────────────────────────────────────────────

/// Fraction of trades with positive net P&L.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Mean P&L of winning trades (0.0 without winners).
pub fn avg_win(trades: &[Trade]) -> f64 {
    let winners: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_winner())
        .map(|t| t.pnl)
        .collect();
    if winners.is_empty() {
        return 0.0;
    }
    winners.iter().sum::<f64>() / winners.len() as f64
}

/// Mean absolute P&L of losing trades (0.0 without losers).
pub fn avg_loss(trades: &[Trade]) -> f64 {
    let losers: Vec<f64> = trades
        .iter()
        .filter(|t| !t.is_winner())
        .map(|t| t.pnl.abs())
        .collect();
    if losers.is_empty() {
        return 0.0;
    }
    losers.iter().sum::<f64>() / losers.len() as f64
}

/// Expectancy per trade: `win_rate × avg_win − (1 − win_rate) × avg_loss`.
pub fn expectancy(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wr = win_rate(trades);
    wr * avg_win(trades) - (1.0 - wr) * avg_loss(trades)
}

/// Profit factor: gross wins / gross losses.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_win: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();
    if gross_loss < 1e-12 {
        return 0.0;
    }
    gross_win / gross_loss
}

/// Longest run of consecutive winners (`winners == true`) or losers.
pub fn longest_streak(trades: &[Trade], winners: bool) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// 95% confidence interval on expected trade P&L:
/// `mean ± 1.96 × (std / √n)`.
pub fn confidence_interval_95(trades: &[Trade]) -> (f64, f64) {
    if trades.is_empty() {
        return (0.0, 0.0);
    }
    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let mean = mean_f64(&pnls);
    if pnls.len() < 2 {
        return (mean, mean);
    }
    let stderr = std_dev(&pnls) / (pnls.len() as f64).sqrt();
    (mean - 1.96 * stderr, mean + 1.96 * stderr)
}

// ─── Segmentation ───────────────────────────────────────────────────

/// Per-regime metrics: one computation per regime present in the trade
/// list, over that regime's trade subset.
///
/// The calculator takes the subset directly; equity-curve-derived fields
/// are computed over the shared full curve.
pub fn metrics_by_regime(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: f64,
) -> HashMap<Regime, PerformanceMetrics> {
    let mut by_regime: HashMap<Regime, Vec<Trade>> = HashMap::new();
    for trade in trades {
        by_regime
            .entry(trade.regime)
            .or_default()
            .push(trade.clone());
    }
    by_regime
        .into_iter()
        .map(|(regime, subset)| {
            (
                regime,
                PerformanceMetrics::compute(&subset, equity_curve, initial_capital),
            )
        })
        .collect()
}

/// Month-keyed return map ("YYYY-MM" → compounded return for the month).
pub fn monthly_returns(equity_curve: &[EquityPoint]) -> BTreeMap<String, f64> {
    let mut months = BTreeMap::new();
    let Some(first) = equity_curve.first() else {
        return months;
    };

    let mut month_start_equity = first.equity / (1.0 + first.period_return).max(1e-12);
    let mut current_key = first.timestamp.format("%Y-%m").to_string();
    let mut last_equity = first.equity;

    for point in equity_curve {
        let key = point.timestamp.format("%Y-%m").to_string();
        if key != current_key {
            if month_start_equity > 0.0 {
                months.insert(current_key.clone(), last_equity / month_start_equity - 1.0);
            }
            month_start_equity = last_equity;
            current_key = key;
        }
        last_equity = point.equity;
    }
    if month_start_equity > 0.0 {
        months.insert(current_key, last_equity / month_start_equity - 1.0);
    }
    months
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Per-bar returns straight off the equity points.
pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve.iter().map(|p| p.period_return).collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
