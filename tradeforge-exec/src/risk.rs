//! Pre-trade risk validation.
//!
//! Every check is independent and all of them run; nothing short-circuits.
//! Each check carries a severity: any failed error-severity check fails
//! the whole validation, warnings never block submission.

use crate::venue::AccountBalance;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tradeforge_core::domain::{Order, OrderType};

/// Risk limits owned by the order router. Read-only at validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: f64,
    pub max_order_value: f64,
    pub max_daily_orders: usize,
    pub max_open_positions: usize,
    pub max_leverage: f64,
    /// Fractional drawdown at which new entries stop (informational here;
    /// enforced by the operator).
    pub max_drawdown_pct: f64,
    pub min_account_balance: f64,
    /// When present, only these symbols may trade.
    pub allowed_symbols: Option<Vec<String>>,
    pub blocked_symbols: Vec<String>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: 10_000.0,
            max_order_value: 1_000_000.0,
            max_daily_orders: 200,
            max_open_positions: 20,
            max_leverage: 1.0,
            max_drawdown_pct: 0.25,
            min_account_balance: 0.0,
            allowed_symbols: None,
            blocked_symbols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Info,
    Warning,
    Error,
}

/// One validation check outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheck {
    pub name: String,
    pub severity: CheckSeverity,
    pub passed: bool,
    pub message: String,
}

/// All check outcomes for one order, collected rather than short-circuited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<RiskCheck>,
}

impl ValidationReport {
    /// Passes when no error-severity check failed. Warnings don't block.
    pub fn passed(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| !c.passed && c.severity == CheckSeverity::Error)
    }

    pub fn failures(&self) -> Vec<&RiskCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Reason string for a rejected-order event.
    pub fn rejection_reason(&self) -> String {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == CheckSeverity::Error)
            .map(|c| c.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Rolling calendar-day order counter, reset on day rollover.
#[derive(Debug, Clone)]
pub struct DailyOrderCounter {
    date: NaiveDate,
    count: usize,
}

impl DailyOrderCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            date: now.date_naive(),
            count: 0,
        }
    }

    /// Orders counted so far today; rolls the window if the day changed.
    pub fn current(&mut self, now: DateTime<Utc>) -> usize {
        let today = now.date_naive();
        if today != self.date {
            self.date = today;
            self.count = 0;
        }
        self.count
    }

    pub fn increment(&mut self, now: DateTime<Utc>) {
        self.current(now);
        self.count += 1;
    }
}

/// Stateless validator over a set of limits.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    limits: RiskLimits,
}

impl OrderValidator {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run every check and collect the outcomes.
    ///
    /// `estimated_price` is used for notional when the order itself has no
    /// price (market orders).
    pub fn validate(
        &self,
        order: &Order,
        account: &AccountBalance,
        open_positions: usize,
        daily_orders: usize,
        estimated_price: Option<f64>,
    ) -> ValidationReport {
        let mut checks = Vec::new();
        let limits = &self.limits;

        // Required fields.
        checks.push(check(
            "required_fields",
            CheckSeverity::Error,
            !order.symbol.trim().is_empty(),
            if order.symbol.trim().is_empty() {
                "order has no symbol".to_string()
            } else {
                "required fields present".to_string()
            },
        ));

        // Positive quantity.
        checks.push(check(
            "positive_quantity",
            CheckSeverity::Error,
            order.quantity > 0.0,
            format!("quantity {} must be positive", order.quantity),
        ));

        // Allow/block lists.
        let allowed = match &limits.allowed_symbols {
            Some(list) => list.iter().any(|s| s == &order.symbol),
            None => true,
        };
        checks.push(check(
            "symbol_allowed",
            CheckSeverity::Error,
            allowed,
            format!("symbol '{}' is not on the allow list", order.symbol),
        ));
        let blocked = limits.blocked_symbols.iter().any(|s| s == &order.symbol);
        checks.push(check(
            "symbol_not_blocked",
            CheckSeverity::Error,
            !blocked,
            format!("symbol '{}' is on the block list", order.symbol),
        ));

        // Position size.
        checks.push(check(
            "max_position_size",
            CheckSeverity::Error,
            order.quantity <= limits.max_position_size,
            format!(
                "quantity {} exceeds max position size {}",
                order.quantity, limits.max_position_size
            ),
        ));

        // Order value.
        let reference_price = order
            .order_type
            .limit_price()
            .or(order.order_type.stop_price())
            .or(estimated_price);
        let notional = reference_price.map(|p| p * order.quantity);
        match notional {
            Some(value) => {
                checks.push(check(
                    "max_order_value",
                    CheckSeverity::Error,
                    value <= limits.max_order_value,
                    format!(
                        "estimated notional {:.2} exceeds max order value {:.2}",
                        value, limits.max_order_value
                    ),
                ));
                checks.push(check(
                    "buying_power",
                    CheckSeverity::Error,
                    value <= account.buying_power * limits.max_leverage,
                    format!(
                        "estimated notional {:.2} exceeds available buying power {:.2}",
                        value,
                        account.buying_power * limits.max_leverage
                    ),
                ));
            }
            None => {
                checks.push(check(
                    "max_order_value",
                    CheckSeverity::Warning,
                    false,
                    "no price available to estimate notional".to_string(),
                ));
            }
        }

        // Daily order budget.
        checks.push(check(
            "max_daily_orders",
            CheckSeverity::Error,
            daily_orders < limits.max_daily_orders,
            format!(
                "daily order count {} has reached the limit {}",
                daily_orders, limits.max_daily_orders
            ),
        ));

        // Open position count. Warning only: an exit for an existing
        // position must still go through.
        checks.push(check(
            "max_open_positions",
            CheckSeverity::Warning,
            open_positions < limits.max_open_positions,
            format!(
                "open position count {} at or above limit {}",
                open_positions, limits.max_open_positions
            ),
        ));

        // Minimum balance.
        checks.push(check(
            "min_account_balance",
            CheckSeverity::Error,
            account.cash >= limits.min_account_balance,
            format!(
                "account cash {:.2} below minimum balance {:.2}",
                account.cash, limits.min_account_balance
            ),
        ));

        // Order-type-specific price requirements. The sum type makes an
        // absent price unrepresentable, so the check is on positivity.
        let (price_ok, price_msg) = match &order.order_type {
            OrderType::Market => (true, "market order needs no price".to_string()),
            OrderType::Limit { limit_price } => (
                *limit_price > 0.0,
                format!("limit price {limit_price} must be positive"),
            ),
            OrderType::Stop { stop_price } => (
                *stop_price > 0.0,
                format!("stop price {stop_price} must be positive"),
            ),
            OrderType::StopLimit {
                stop_price,
                limit_price,
            } => (
                *stop_price > 0.0 && *limit_price > 0.0,
                format!("stop {stop_price} and limit {limit_price} must be positive"),
            ),
        };
        checks.push(check(
            "order_type_prices",
            CheckSeverity::Error,
            price_ok,
            price_msg,
        ));

        ValidationReport { checks }
    }
}

fn check(name: &str, severity: CheckSeverity, passed: bool, message: String) -> RiskCheck {
    RiskCheck {
        name: name.to_string(),
        severity,
        passed,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tradeforge_core::domain::{OrderId, OrderSide};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 14, 0, 0).unwrap()
    }

    fn account() -> AccountBalance {
        AccountBalance {
            cash: 100_000.0,
            equity: 100_000.0,
            buying_power: 100_000.0,
        }
    }

    fn validator() -> OrderValidator {
        OrderValidator::new(RiskLimits {
            max_position_size: 1_000.0,
            max_order_value: 50_000.0,
            max_daily_orders: 10,
            max_open_positions: 3,
            min_account_balance: 1_000.0,
            ..RiskLimits::default()
        })
    }

    fn market_order(qty: f64) -> Order {
        Order::market(OrderId(1), "AAPL", OrderSide::Buy, qty, now())
    }

    #[test]
    fn clean_order_passes() {
        let report = validator().validate(&market_order(100.0), &account(), 0, 0, Some(100.0));
        assert!(report.passed());
        assert!(report.failures().is_empty());
    }

    #[test]
    fn oversized_quantity_fails_with_position_size_message() {
        let report = validator().validate(&market_order(1_001.0), &account(), 0, 0, Some(10.0));
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("position size"));
    }

    #[test]
    fn notional_above_max_order_value_fails_independently() {
        // 600 × 100 = 60_000 > 50_000, while every other field is fine.
        let report = validator().validate(&market_order(600.0), &account(), 0, 0, Some(100.0));
        assert!(!report.passed());
        let failed: Vec<_> = report
            .failures()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert!(failed.contains(&"max_order_value".to_string()));
        // The independent checks all still ran.
        assert!(report.checks.len() >= 9);
    }

    #[test]
    fn all_failures_are_collected_not_short_circuited() {
        // Negative quantity AND blocked symbol AND oversized value.
        let mut order = market_order(-5.0);
        order.symbol = "BLOCKED".into();
        let mut limits = validator().limits().clone();
        limits.blocked_symbols = vec!["BLOCKED".into()];
        let report =
            OrderValidator::new(limits).validate(&order, &account(), 0, 0, Some(100.0));

        let failed_names: Vec<_> = report.failures().iter().map(|c| c.name.clone()).collect();
        assert!(failed_names.contains(&"positive_quantity".to_string()));
        assert!(failed_names.contains(&"symbol_not_blocked".to_string()));
    }

    #[test]
    fn open_position_limit_is_a_warning_not_a_block() {
        let report = validator().validate(&market_order(10.0), &account(), 5, 0, Some(100.0));
        assert!(report.passed(), "warnings must not block submission");
        assert!(report
            .failures()
            .iter()
            .any(|c| c.name == "max_open_positions" && c.severity == CheckSeverity::Warning));
    }

    #[test]
    fn daily_order_limit_blocks() {
        let report = validator().validate(&market_order(10.0), &account(), 0, 10, Some(100.0));
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("daily order count"));
    }

    #[test]
    fn low_balance_blocks() {
        let poor = AccountBalance {
            cash: 500.0,
            equity: 500.0,
            buying_power: 500.0,
        };
        let report = validator().validate(&market_order(1.0), &poor, 0, 0, Some(100.0));
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("minimum balance"));
    }

    #[test]
    fn buying_power_blocks() {
        let thin = AccountBalance {
            cash: 20_000.0,
            equity: 20_000.0,
            buying_power: 2_000.0,
        };
        let report = validator().validate(&market_order(100.0), &thin, 0, 0, Some(100.0));
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("buying power"));
    }

    #[test]
    fn allow_list_excludes_other_symbols() {
        let mut limits = RiskLimits::default();
        limits.allowed_symbols = Some(vec!["SPY".into()]);
        let report =
            OrderValidator::new(limits).validate(&market_order(1.0), &account(), 0, 0, Some(100.0));
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("allow list"));
    }

    #[test]
    fn limit_order_uses_its_own_price_for_notional() {
        let order = Order::limit(OrderId(2), "AAPL", OrderSide::Buy, 600.0, 100.0, now());
        // 600 × 100 = 60_000 > 50_000 even with no estimated price supplied.
        let report = validator().validate(&order, &account(), 0, 0, None);
        assert!(!report.passed());
        assert!(report.rejection_reason().contains("max order value"));
    }

    #[test]
    fn daily_counter_rolls_over_at_midnight() {
        let mut counter = DailyOrderCounter::new(now());
        counter.increment(now());
        counter.increment(now());
        assert_eq!(counter.current(now()), 2);

        let tomorrow = now() + chrono::Duration::days(1);
        assert_eq!(counter.current(tomorrow), 0);
        counter.increment(tomorrow);
        assert_eq!(counter.current(tomorrow), 1);
    }
}
