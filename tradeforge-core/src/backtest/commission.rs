//! Commission model — fixed per trade or a percentage of notional,
//! pluggable per run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionModel {
    /// Fixed dollar amount per fill.
    PerTrade { amount: f64 },
    /// Fraction of notional per fill (0.0005 = 5 bps).
    PercentNotional { rate: f64 },
    /// No commission.
    None,
}

impl CommissionModel {
    /// Commission for a fill of the given notional value.
    pub fn compute(&self, notional: f64) -> f64 {
        match self {
            CommissionModel::PerTrade { amount } => *amount,
            CommissionModel::PercentNotional { rate } => notional.abs() * rate,
            CommissionModel::None => 0.0,
        }
    }
}

impl Default for CommissionModel {
    fn default() -> Self {
        CommissionModel::None
    }
}
