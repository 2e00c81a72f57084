//! Slippage model — base basis points, optionally scaled by recent
//! intrabar volatility and capped.
//!
//! Directional: buyers pay a higher price, sellers receive a lower one.

use crate::domain::{Bar, OrderSide};
use serde::{Deserialize, Serialize};

/// Slippage in basis points, volatility-scaled.
///
/// Effective bps = `min(base_bps × (1 + range_fraction × vol_scale), max_bps)`
/// where `range_fraction = (high − low) / close` of the fill bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageModel {
    pub base_bps: f64,
    /// Volatility scaling factor `k`; 0.0 disables scaling.
    pub vol_scale: f64,
    /// Upper bound on effective slippage in basis points.
    pub max_bps: f64,
}

impl SlippageModel {
    pub fn new(base_bps: f64, vol_scale: f64, max_bps: f64) -> Self {
        Self {
            base_bps,
            vol_scale,
            max_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Fixed slippage with no volatility scaling.
    pub fn fixed_bps(bps: f64) -> Self {
        Self::new(bps, 0.0, bps)
    }

    fn effective_bps(&self, bar: Option<&Bar>) -> f64 {
        let scaled = match bar {
            Some(bar) if self.vol_scale > 0.0 => {
                self.base_bps * (1.0 + bar.range_fraction() * self.vol_scale)
            }
            _ => self.base_bps,
        };
        scaled.min(self.max_bps)
    }

    /// Apply slippage to a raw fill price.
    ///
    /// Returns `(slipped_price, slippage_dollar_amount)` for `quantity` units.
    pub fn apply(
        &self,
        raw_price: f64,
        side: OrderSide,
        quantity: f64,
        bar: Option<&Bar>,
    ) -> (f64, f64) {
        let bps = self.effective_bps(bar);
        if bps <= 0.0 {
            return (raw_price, 0.0);
        }
        let fraction = bps / 10_000.0;
        match side {
            OrderSide::Buy => {
                let slipped = raw_price * (1.0 + fraction);
                (slipped, (slipped - raw_price) * quantity)
            }
            OrderSide::Sell => {
                let slipped = raw_price * (1.0 - fraction);
                (slipped, (raw_price - slipped) * quantity)
            }
        }
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::frictionless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            symbol: "SPY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap(),
            timeframe: Timeframe::Day,
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn frictionless_returns_raw_price() {
        let model = SlippageModel::frictionless();
        let (price, slip) = model.apply(100.0, OrderSide::Buy, 50.0, None);
        assert_eq!(price, 100.0);
        assert_eq!(slip, 0.0);
    }

    #[test]
    fn buy_slips_up_sell_slips_down() {
        let model = SlippageModel::fixed_bps(10.0);
        let (buy, buy_amt) = model.apply(100.0, OrderSide::Buy, 100.0, None);
        assert!((buy - 100.10).abs() < 1e-10);
        assert!((buy_amt - 10.0).abs() < 1e-10);

        let (sell, sell_amt) = model.apply(100.0, OrderSide::Sell, 100.0, None);
        assert!((sell - 99.90).abs() < 1e-10);
        assert!((sell_amt - 10.0).abs() < 1e-10);
    }

    #[test]
    fn volatility_scaling_widens_slippage() {
        let model = SlippageModel::new(10.0, 2.0, 100.0);
        // range/close = (105-95)/100 = 0.10 → effective = 10 * (1 + 0.2) = 12 bps
        let wide = bar(100.0, 105.0, 95.0, 100.0);
        let (price, _) = model.apply(100.0, OrderSide::Buy, 1.0, Some(&wide));
        assert!((price - 100.12).abs() < 1e-10);
    }

    #[test]
    fn cap_bounds_effective_slippage() {
        let model = SlippageModel::new(10.0, 100.0, 15.0);
        let wide = bar(100.0, 110.0, 90.0, 100.0); // range_fraction = 0.2 → 10*(1+20)=210 bps uncapped
        let (price, _) = model.apply(100.0, OrderSide::Buy, 1.0, Some(&wide));
        // Capped at 15 bps
        assert!((price - 100.15).abs() < 1e-10);
    }
}
