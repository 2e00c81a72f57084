//! Position manager — the single source of truth for open managed
//! positions, independent of whichever venue produced the fills.
//!
//! All mutation happens under one async mutex, so fills for a symbol are
//! applied strictly in arrival order (single-writer discipline per key).
//! Reconciliation reports discrepancies as data; it never silently
//! corrects them. Only the explicit `force_sync` adopts the venue's view.

use crate::venue::{ExecutionVenue, VenueError, VenuePosition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tradeforge_core::domain::{Fill, OrderSide, Position, PositionSide, QTY_EPSILON};

/// How badly a reconciliation mismatch diverges, relative to position size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancySeverity {
    /// Below 5% of position size.
    Low,
    /// 5% to 20%.
    Medium,
    /// Above 20%, or a position missing entirely on one side.
    High,
}

/// A quantity mismatch between the managed book and the venue's report.
///
/// `difference = venue_quantity − internal_quantity` (signed quantities,
/// long positive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub symbol: String,
    pub internal_quantity: f64,
    pub venue_quantity: f64,
    pub difference: f64,
    pub severity: DiscrepancySeverity,
}

impl Discrepancy {
    fn classify(internal: f64, venue: f64) -> DiscrepancySeverity {
        let difference = (venue - internal).abs();
        let base = internal.abs().max(venue.abs());
        if base < QTY_EPSILON {
            return DiscrepancySeverity::High;
        }
        let relative = difference / base;
        if relative < 0.05 {
            DiscrepancySeverity::Low
        } else if relative < 0.20 {
            DiscrepancySeverity::Medium
        } else {
            DiscrepancySeverity::High
        }
    }
}

/// What applying a fill did to the managed book.
#[derive(Debug, Clone)]
pub enum PositionUpdate {
    Opened(Position),
    Increased(Position),
    Reduced { position: Position, realized_pnl: f64 },
    Closed { symbol: String, realized_pnl: f64 },
}

/// Authoritative in-memory position store.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: Mutex<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fill in arrival order.
    ///
    /// A fill on the flat book opens a position in the fill's direction;
    /// a same-side fill adds; an opposite-side fill reduces and realizes
    /// proportional P&L, deleting the position at ≈0 remaining quantity.
    pub async fn apply_fill(&self, symbol: &str, side: OrderSide, fill: Fill) -> PositionUpdate {
        let mut positions = self.positions.lock().await;

        match positions.get_mut(symbol) {
            None => {
                let position_side = match side {
                    OrderSide::Buy => PositionSide::Long,
                    OrderSide::Sell => PositionSide::Short,
                };
                let position = Position::open(symbol, position_side, fill);
                positions.insert(symbol.to_string(), position.clone());
                info!(symbol, side = ?position_side, quantity = position.quantity, "position opened");
                PositionUpdate::Opened(position)
            }
            Some(position) => {
                if side == position.side.entry_order_side() {
                    position.apply_entry_fill(fill);
                    PositionUpdate::Increased(position.clone())
                } else {
                    let realized = position.apply_exit_fill(fill);
                    if position.is_closed() {
                        let closed = positions.remove(symbol).expect("position present");
                        info!(symbol, realized_pnl = closed.realized_pnl, "position closed");
                        PositionUpdate::Closed {
                            symbol: symbol.to_string(),
                            realized_pnl: closed.realized_pnl,
                        }
                    } else {
                        PositionUpdate::Reduced {
                            position: position.clone(),
                            realized_pnl: realized,
                        }
                    }
                }
            }
        }
    }

    pub async fn get_position(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().await.get(symbol).cloned()
    }

    pub async fn get_positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    pub async fn open_position_count(&self) -> usize {
        self.positions.lock().await.len()
    }

    /// Total unrealized P&L at the given prices; positions without a
    /// price are marked at entry (zero unrealized).
    pub async fn unrealized_pnl(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .lock()
            .await
            .values()
            .map(|p| {
                let price = prices.get(&p.symbol).copied().unwrap_or(p.avg_entry_price);
                p.unrealized_pnl(price)
            })
            .sum()
    }

    /// Diff the managed book against the venue's report.
    ///
    /// One `Discrepancy` per symbol whose signed quantity differs beyond
    /// tolerance. Reported, never auto-corrected.
    pub async fn reconcile(
        &self,
        venue: &dyn ExecutionVenue,
    ) -> Result<Vec<Discrepancy>, VenueError> {
        let venue_positions = venue.get_positions().await?;
        let positions = self.positions.lock().await;

        let venue_by_symbol: HashMap<&str, &VenuePosition> = venue_positions
            .iter()
            .map(|p| (p.symbol.as_str(), p))
            .collect();

        let mut symbols: HashSet<&str> = positions.keys().map(|s| s.as_str()).collect();
        symbols.extend(venue_by_symbol.keys().copied());

        let mut discrepancies = Vec::new();
        for symbol in symbols {
            let internal = positions
                .get(symbol)
                .map(|p| match p.side {
                    PositionSide::Long => p.quantity,
                    PositionSide::Short => -p.quantity,
                })
                .unwrap_or(0.0);
            let venue_qty = venue_by_symbol.get(symbol).map(|p| p.quantity).unwrap_or(0.0);

            if (venue_qty - internal).abs() > QTY_EPSILON {
                warn!(
                    symbol,
                    internal, venue_qty, "reconciliation mismatch"
                );
                discrepancies.push(Discrepancy {
                    symbol: symbol.to_string(),
                    internal_quantity: internal,
                    venue_quantity: venue_qty,
                    difference: venue_qty - internal,
                    severity: Discrepancy::classify(internal, venue_qty),
                });
            }
        }
        discrepancies.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(discrepancies)
    }

    /// Explicit operator action: replace the managed book with the
    /// venue's report. The only path that "corrects" a discrepancy.
    pub async fn force_sync(&self, venue: &dyn ExecutionVenue) -> Result<usize, VenueError> {
        let venue_positions = venue.get_positions().await?;
        let mut positions = self.positions.lock().await;
        positions.clear();

        for vp in &venue_positions {
            if vp.quantity.abs() < QTY_EPSILON {
                continue;
            }
            let side = if vp.quantity > 0.0 {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let fill = Fill {
                order_id: tradeforge_core::domain::OrderId(0),
                execution_id: tradeforge_core::domain::ExecutionId::new("FORCE-SYNC"),
                quantity: vp.quantity.abs(),
                price: vp.avg_price,
                commission: 0.0,
                timestamp: chrono::Utc::now(),
            };
            positions.insert(vp.symbol.clone(), Position::open(&vp.symbol, side, fill));
        }
        info!(count = positions.len(), "force re-sync from venue");
        Ok(positions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tradeforge_core::domain::{ExecutionId, OrderId};

    fn fill(qty: f64, price: f64) -> Fill {
        Fill {
            order_id: OrderId(1),
            execution_id: ExecutionId::new("X"),
            quantity: qty,
            price,
            commission: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 14, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn entry_fill_opens_position() {
        let pm = PositionManager::new();
        let update = pm.apply_fill("AAPL", OrderSide::Buy, fill(100.0, 150.0)).await;
        assert!(matches!(update, PositionUpdate::Opened(_)));

        let pos = pm.get_position("AAPL").await.unwrap();
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity, 100.0);
        assert_eq!(pos.avg_entry_price, 150.0);
    }

    #[tokio::test]
    async fn same_side_fill_augments_with_weighted_average() {
        let pm = PositionManager::new();
        pm.apply_fill("AAPL", OrderSide::Buy, fill(100.0, 100.0)).await;
        let update = pm.apply_fill("AAPL", OrderSide::Buy, fill(50.0, 106.0)).await;
        assert!(matches!(update, PositionUpdate::Increased(_)));

        let pos = pm.get_position("AAPL").await.unwrap();
        assert_eq!(pos.quantity, 150.0);
        assert!((pos.avg_entry_price - 102.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn opposite_fill_reduces_then_closes() {
        let pm = PositionManager::new();
        pm.apply_fill("AAPL", OrderSide::Buy, fill(100.0, 100.0)).await;

        let update = pm.apply_fill("AAPL", OrderSide::Sell, fill(40.0, 110.0)).await;
        match update {
            PositionUpdate::Reduced { realized_pnl, .. } => {
                assert!((realized_pnl - 400.0).abs() < 1e-10);
            }
            other => panic!("expected Reduced, got {other:?}"),
        }

        let update = pm.apply_fill("AAPL", OrderSide::Sell, fill(60.0, 105.0)).await;
        match update {
            PositionUpdate::Closed { realized_pnl, .. } => {
                // 400 from the first reduction + 60 × 5 from the second.
                assert!((realized_pnl - 700.0).abs() < 1e-10);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(pm.get_position("AAPL").await.is_none());
    }

    #[tokio::test]
    async fn short_positions_realize_inverted() {
        let pm = PositionManager::new();
        pm.apply_fill("AAPL", OrderSide::Sell, fill(100.0, 100.0)).await;
        let update = pm.apply_fill("AAPL", OrderSide::Buy, fill(100.0, 90.0)).await;
        match update {
            PositionUpdate::Closed { realized_pnl, .. } => {
                assert!((realized_pnl - 1000.0).abs() < 1e-10);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrealized_pnl_over_price_map() {
        let pm = PositionManager::new();
        pm.apply_fill("AAPL", OrderSide::Buy, fill(100.0, 100.0)).await;
        pm.apply_fill("MSFT", OrderSide::Sell, fill(10.0, 400.0)).await;

        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 105.0);
        prices.insert("MSFT".to_string(), 390.0);
        // long: +500, short: +100
        assert!((pm.unrealized_pnl(&prices).await - 600.0).abs() < 1e-10);
    }

    // ── Severity classification ──

    #[test]
    fn severity_scales_with_relative_difference() {
        assert_eq!(
            Discrepancy::classify(100.0, 99.0),
            DiscrepancySeverity::Low
        );
        assert_eq!(
            Discrepancy::classify(100.0, 90.0),
            DiscrepancySeverity::Medium
        );
        assert_eq!(
            Discrepancy::classify(100.0, 50.0),
            DiscrepancySeverity::High
        );
        assert_eq!(Discrepancy::classify(0.0, 10.0), DiscrepancySeverity::High);
    }
}
