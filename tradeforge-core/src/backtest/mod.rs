//! Historical backtester — deterministic replay of market data through a
//! strategy with simulated fills.

pub mod commission;
pub mod config;
pub mod engine;
pub mod slippage;

pub use commission::CommissionModel;
pub use config::BacktestConfig;
pub use engine::{run_backtest, OpenPositionSnapshot, RunOutput, SkippedSignal};
pub use slippage::SlippageModel;
