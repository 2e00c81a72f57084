//! Bar-by-bar replay loop — the heart of the backtesting engine.
//!
//! Per timestamp, in order:
//! 1. Skip timestamps outside the configured window
//! 2. Update MAE/MFE for open positions; simulate intrabar stops
//! 3. Feed the latest bar per symbol to the strategy
//! 4. Execute entry/exit/stop-adjustment signals (suppressed during warmup)
//! 5. Append one equity-curve point
//!
//! After the loop, all surviving positions are force-closed at the last
//! observed price. The loop is strictly single-threaded; determinism is
//! the point.

use crate::backtest::config::BacktestConfig;
use crate::data::MarketData;
use crate::domain::{
    Bar, EquityPoint, ExitReason, PositionSide, Regime, Signal, SignalKind, Strategy, Trade,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// An entry signal the engine declined to execute, kept for the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Snapshot of a position still open when the replay window ended,
/// taken immediately before the forced close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionSnapshot {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub current_stop: Option<f64>,
    pub unrealized_pnl: f64,
}

/// Everything a replay run produces. Metrics are computed downstream.
#[derive(Debug)]
pub struct RunOutput {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub open_positions: Vec<OpenPositionSnapshot>,
    pub skipped_signals: Vec<SkippedSignal>,
    pub final_equity: f64,
    pub bar_count: usize,
    pub warmup_bars: usize,
}

/// A position open inside the simulation.
struct SimPosition {
    side: PositionSide,
    quantity: f64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    stop: Option<f64>,
    risk_amount: f64,
    regime: Regime,
    entry_slippage: f64,
    entry_commission: f64,
    /// Worst open P&L observed, ≤ 0.
    mae: f64,
    /// Best open P&L observed, ≥ 0.
    mfe: f64,
}

impl SimPosition {
    fn direction(&self) -> f64 {
        match self.side {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    fn unrealized(&self, price: f64) -> f64 {
        self.direction() * (price - self.entry_price) * self.quantity
    }

    /// Update excursion extremes from a bar's high/low.
    fn update_excursion(&mut self, bar: &Bar) {
        let (adverse, favorable) = match self.side {
            PositionSide::Long => (bar.low, bar.high),
            PositionSide::Short => (bar.high, bar.low),
        };
        self.mae = self.mae.min(self.unrealized_at(adverse));
        self.mfe = self.mfe.max(self.unrealized_at(favorable));
    }

    fn unrealized_at(&self, price: f64) -> f64 {
        self.direction() * (price - self.entry_price) * self.quantity
    }

    /// Whether the bar pierced the protective stop, and the fill price if
    /// so. Gaps through the stop fill at the bar's open, not the stop.
    fn stop_hit(&self, bar: &Bar) -> Option<f64> {
        let stop = self.stop?;
        match self.side {
            PositionSide::Long if bar.low <= stop => Some(stop.min(bar.open)),
            PositionSide::Short if bar.high >= stop => Some(stop.max(bar.open)),
            _ => None,
        }
    }
}

/// Mutable replay state.
struct ReplayState {
    cash: f64,
    open: HashMap<String, SimPosition>,
    trades: Vec<Trade>,
    skipped: Vec<SkippedSignal>,
    /// Last observed close per symbol, for equity marks and forced closes.
    last_close: HashMap<String, f64>,
    peak_equity: f64,
    prev_equity: Option<f64>,
}

impl ReplayState {
    fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            open: HashMap::new(),
            trades: Vec::new(),
            skipped: Vec::new(),
            last_close: HashMap::new(),
            peak_equity: initial_capital,
            prev_equity: None,
        }
    }

    /// `equity = cash + Σ unrealized_pnl(open positions)`.
    ///
    /// Cash is settled on realized P&L only, so this identity holds by
    /// construction; the debug assertion keeps it honest.
    fn equity(&self) -> f64 {
        let unrealized: f64 = self
            .open
            .iter()
            .map(|(symbol, pos)| {
                let price = self
                    .last_close
                    .get(symbol)
                    .copied()
                    .unwrap_or(pos.entry_price);
                pos.unrealized(price)
            })
            .sum();
        let equity = self.cash + unrealized;
        debug_assert!(equity.is_finite(), "equity must stay finite");
        equity
    }

    /// Capital committed to open positions at their entry prices. Cash is
    /// settled on realized P&L only, so available buying power is
    /// `cash − committed()`.
    fn committed(&self) -> f64 {
        self.open
            .values()
            .map(|pos| pos.entry_price * pos.quantity)
            .sum()
    }

    fn skip(&mut self, symbol: &str, timestamp: DateTime<Utc>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(symbol, %timestamp, reason = %reason, "signal skipped");
        self.skipped.push(SkippedSignal {
            symbol: symbol.to_string(),
            timestamp,
            reason,
        });
    }

    fn close_position(
        &mut self,
        symbol: &str,
        exit_price: f64,
        exit_slippage: f64,
        exit_commission: f64,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) {
        let pos = match self.open.remove(symbol) {
            Some(p) => p,
            None => return,
        };
        let gross = pos.unrealized(exit_price);
        let commission = pos.entry_commission + exit_commission;
        let pnl = gross - exit_commission;
        // Entry commission was already settled against cash at entry time.
        self.cash += pnl;

        self.trades.push(Trade {
            symbol: symbol.to_string(),
            side: pos.side,
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            exit_time,
            exit_price,
            quantity: pos.quantity,
            risk_amount: pos.risk_amount,
            regime: pos.regime,
            slippage: pos.entry_slippage + exit_slippage,
            commission,
            pnl: gross - commission,
            exit_reason,
            mae: pos.mae,
            mfe: pos.mfe,
        });
    }
}

/// Replay `data` through `strategy` under `config`.
///
/// `data` is already validated (ordering and price sanity are load-time
/// preconditions), so the loop itself is infallible.
pub fn run_backtest(
    data: &MarketData,
    strategy: &mut dyn Strategy,
    config: &BacktestConfig,
) -> RunOutput {
    let mut state = ReplayState::new(config.initial_capital);
    let mut equity_curve = Vec::with_capacity(data.timestamps().len());
    let mut processed = 0usize;

    for &t in data.timestamps() {
        if !config.in_window(t) {
            continue;
        }
        processed += 1;
        let in_warmup = processed <= config.warmup_bars;

        // Fresh bars only: a carried-forward bar's range was already
        // applied to excursions and stops on its own timestamp.
        let mut fresh: HashMap<String, Bar> = HashMap::new();
        for symbol in data.symbols() {
            if let Some(bar) = data.series(symbol).and_then(|s| s.at(t)) {
                fresh.insert(symbol.to_string(), bar.clone());
                state.last_close.insert(symbol.to_string(), bar.close);
            }
        }

        // Excursion tracking and intrabar stop simulation for open positions.
        let open_symbols: Vec<String> = state.open.keys().cloned().collect();
        for symbol in open_symbols {
            let bar = match fresh.get(&symbol) {
                Some(b) => b.clone(),
                None => continue,
            };
            let stop_fill = {
                let pos = state.open.get_mut(&symbol).expect("position exists");
                pos.update_excursion(&bar);
                if config.intrabar_stops {
                    pos.stop_hit(&bar)
                } else {
                    None
                }
            };
            if let Some(fill_price) = stop_fill {
                let pos = &state.open[&symbol];
                let commission = config
                    .commission
                    .compute(fill_price * pos.quantity);
                state.close_position(&symbol, fill_price, 0.0, commission, t, ExitReason::StopLoss);
            }
        }

        // Feed the strategy the latest available bar per symbol.
        let visible = data.bars_at(t);
        let signals = strategy.on_bar(t, &visible);

        if !in_warmup {
            for signal in signals {
                handle_signal(&mut state, &signal, &visible, config, t);
            }
        }

        // One equity point per processed timestamp.
        let equity = state.equity();
        state.peak_equity = state.peak_equity.max(equity);
        equity_curve.push(EquityPoint::next(
            t,
            equity,
            state.peak_equity,
            state.prev_equity,
            state.open.len(),
        ));
        state.prev_equity = Some(equity);
    }

    // Snapshot survivors, then force-close them at the last observed price.
    let last_timestamp = equity_curve
        .last()
        .map(|p| p.timestamp)
        .unwrap_or_else(Utc::now);

    let mut open_positions: Vec<OpenPositionSnapshot> = state
        .open
        .iter()
        .map(|(symbol, pos)| {
            let price = state
                .last_close
                .get(symbol)
                .copied()
                .unwrap_or(pos.entry_price);
            OpenPositionSnapshot {
                symbol: symbol.clone(),
                side: pos.side,
                quantity: pos.quantity,
                entry_price: pos.entry_price,
                entry_time: pos.entry_time,
                current_stop: pos.stop,
                unrealized_pnl: pos.unrealized(price),
            }
        })
        .collect();
    open_positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let survivors: Vec<String> = state.open.keys().cloned().collect();
    for symbol in survivors {
        let price = state.last_close.get(&symbol).copied().unwrap_or_else(|| {
            state.open[&symbol].entry_price
        });
        let commission = config
            .commission
            .compute(price * state.open[&symbol].quantity);
        state.close_position(
            &symbol,
            price,
            0.0,
            commission,
            last_timestamp,
            ExitReason::EndOfBacktest,
        );
    }

    // Forced closes realize P&L after the last equity point; refresh it so
    // final equity reflects the commission of the forced exits.
    let final_equity = state.equity();
    if let Some(last) = equity_curve.last_mut() {
        let peak = state.peak_equity.max(final_equity);
        last.drawdown = (peak - final_equity).max(0.0);
        last.drawdown_pct = if peak > 0.0 { last.drawdown / peak } else { 0.0 };
        last.equity = final_equity;
        last.open_positions = 0;
    }

    RunOutput {
        equity_curve,
        trades: state.trades,
        open_positions,
        skipped_signals: state.skipped,
        final_equity,
        bar_count: processed,
        warmup_bars: config.warmup_bars.min(processed),
    }
}

/// Execute one strategy signal against the simulation.
fn handle_signal(
    state: &mut ReplayState,
    signal: &Signal,
    visible: &HashMap<String, Bar>,
    config: &BacktestConfig,
    t: DateTime<Utc>,
) {
    let symbol = signal.symbol.as_str();
    let bar = match visible.get(symbol) {
        Some(b) => b,
        None => {
            state.skip(symbol, t, "no market data at signal time");
            return;
        }
    };

    match &signal.kind {
        SignalKind::Entry { initial_stop } => {
            if state.open.contains_key(symbol) {
                state.skip(symbol, t, "position already open");
                return;
            }

            let order_side = signal.direction.entry_order_side();
            let (fill_price, slip_amount_per_unit) = {
                let (price, _) = config.slippage.apply(bar.close, order_side, 1.0, Some(bar));
                (price, (price - bar.close).abs())
            };

            let quantity = match signal.quantity {
                Some(q) if q > 0.0 => q,
                Some(_) => {
                    state.skip(symbol, t, "non-positive signal quantity");
                    return;
                }
                None => {
                    let equity = state.equity();
                    let target = equity * config.position_size_pct;
                    (target / fill_price).floor()
                }
            };
            if quantity < 1.0 {
                state.skip(symbol, t, "insufficient capital for one unit");
                return;
            }

            let notional = fill_price * quantity;
            let commission = config.commission.compute(notional);
            let available = state.cash - state.committed();
            if notional + commission > available {
                state.skip(
                    symbol,
                    t,
                    format!(
                        "insufficient capital: need {:.2}, have {:.2}",
                        notional + commission,
                        available
                    ),
                );
                return;
            }

            let risk_amount = initial_stop
                .map(|stop| (fill_price - stop).abs() * quantity)
                .unwrap_or(0.0);

            // Commission settles immediately; notional stays as exposure.
            state.cash -= commission;
            state.open.insert(
                symbol.to_string(),
                SimPosition {
                    side: signal.direction,
                    quantity,
                    entry_price: fill_price,
                    entry_time: t,
                    stop: *initial_stop,
                    risk_amount,
                    regime: signal.regime,
                    entry_slippage: slip_amount_per_unit * quantity,
                    entry_commission: commission,
                    mae: 0.0,
                    mfe: 0.0,
                },
            );
        }
        SignalKind::Exit => {
            let Some(pos) = state.open.get(symbol) else {
                state.skip(symbol, t, "exit signal with no open position");
                return;
            };
            let exit_side = pos.side.exit_order_side();
            let quantity = pos.quantity;
            let (fill_price, slip_amount) =
                config.slippage.apply(bar.close, exit_side, quantity, Some(bar));
            let commission = config.commission.compute(fill_price * quantity);
            state.close_position(symbol, fill_price, slip_amount, commission, t, ExitReason::Signal);
        }
        SignalKind::StopAdjustment { stop } => {
            let Some(pos) = state.open.get_mut(symbol) else {
                state.skip(symbol, t, "stop adjustment with no open position");
                return;
            };
            // Ratchet-only: a protective stop never widens.
            let clamped = match (pos.side, pos.stop) {
                (PositionSide::Long, Some(current)) => stop.max(current),
                (PositionSide::Short, Some(current)) => stop.min(current),
                (_, None) => *stop,
            };
            pos.stop = Some(clamped);
        }
    }
}
