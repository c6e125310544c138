//! Static admission checks applied at order submission.
//!
//! All rules run; violations are collected rather than short-circuited, so a
//! rejection reports every problem with the request at once.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{Order, OrderSide, OrderType, TimeInForce};

/// One field-tagged admission failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending request field.
    pub field: String,
    /// What went wrong.
    pub message: String,
}

impl Violation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True when this violation is the buying-power check, which surfaces as
    /// `InsufficientFunds` rather than `InvalidArgument`.
    #[must_use]
    pub fn is_buying_power(&self) -> bool {
        self.field == "buying_power"
    }
}

/// Market context the validator needs alongside the order itself.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Latest known price for the order's symbol, when a bar exists.
    pub current_price: Option<Decimal>,
    /// The account's available buying power.
    pub buying_power: Decimal,
    /// Whether the market is open at the session's simulated time.
    pub market_open: bool,
}

/// Run every admission rule against `order`. An empty result admits the
/// order; any violation rejects it.
#[must_use]
pub fn validate(order: &Order, ctx: &ValidationContext) -> Vec<Violation> {
    let mut violations = Vec::new();

    check_quantity(order, &mut violations);
    check_price_precision(order, &mut violations);
    check_type_requirements(order, &mut violations);
    check_stop_direction(order, ctx, &mut violations);
    check_extended_hours(order, &mut violations);
    check_tif_market_state(order, ctx, &mut violations);
    check_buying_power(order, ctx, &mut violations);

    violations
}

/// Suggested limit for a stop-limit order: the stop price plus a premium of
/// 4% under $50, 2.5% at or above. Advertised for convenience; never applied
/// automatically.
#[must_use]
pub fn stop_limit_premium(stop_price: Decimal) -> Decimal {
    let premium = if stop_price < dec!(50) {
        dec!(0.04)
    } else {
        dec!(0.025)
    };
    stop_price * (Decimal::ONE + premium)
}

fn check_quantity(order: &Order, violations: &mut Vec<Violation>) {
    match (order.qty, order.notional) {
        (None, None) => {
            violations.push(Violation::new("qty", "either qty or notional is required"));
        }
        (Some(_), Some(_)) => {
            violations.push(Violation::new(
                "qty",
                "qty and notional are mutually exclusive",
            ));
        }
        (Some(qty), None) => {
            if qty <= Decimal::ZERO {
                violations.push(Violation::new("qty", "qty must be greater than zero"));
            }
        }
        (None, Some(notional)) => {
            if notional <= Decimal::ZERO {
                violations.push(Violation::new(
                    "notional",
                    "notional must be greater than zero",
                ));
            }
            if order.order_type != OrderType::Market {
                violations.push(Violation::new(
                    "notional",
                    "notional is only supported for market orders",
                ));
            }
        }
    }
}

/// Sub-dollar prices may carry 4 fractional digits, dollar prices 2.
fn check_price_precision(order: &Order, violations: &mut Vec<Violation>) {
    for (field, price) in [
        ("limit_price", order.limit_price),
        ("stop_price", order.stop_price),
    ] {
        let Some(price) = price else { continue };
        let max_digits = if price >= Decimal::ONE { 2 } else { 4 };
        if fraction_digits(price) > max_digits {
            violations.push(Violation::new(
                field,
                format!("{field} allows at most {max_digits} decimal places at this price level"),
            ));
        }
    }
}

fn check_type_requirements(order: &Order, violations: &mut Vec<Violation>) {
    match order.order_type {
        OrderType::Limit => {
            if order.limit_price.is_none() {
                violations.push(Violation::new("limit_price", "limit orders require limit_price"));
            }
        }
        OrderType::Stop => {
            if order.stop_price.is_none() {
                violations.push(Violation::new("stop_price", "stop orders require stop_price"));
            }
        }
        OrderType::StopLimit => {
            if order.limit_price.is_none() {
                violations.push(Violation::new(
                    "limit_price",
                    "stop-limit orders require limit_price",
                ));
            }
            if order.stop_price.is_none() {
                violations.push(Violation::new(
                    "stop_price",
                    "stop-limit orders require stop_price",
                ));
            }
        }
        OrderType::TrailingStop => {
            if order.trail_price.is_some() == order.trail_percent.is_some() {
                violations.push(Violation::new(
                    "trail_price",
                    "trailing-stop orders require exactly one of trail_price or trail_percent",
                ));
            }
        }
        OrderType::Market => {}
    }
}

fn check_stop_direction(order: &Order, ctx: &ValidationContext, violations: &mut Vec<Violation>) {
    let (Some(stop), Some(current)) = (order.stop_price, ctx.current_price) else {
        return;
    };
    if !matches!(order.order_type, OrderType::Stop | OrderType::StopLimit) {
        return;
    }
    match order.side {
        OrderSide::Buy if stop <= current => {
            violations.push(Violation::new(
                "stop_price",
                "buy stop price must be above the current price",
            ));
        }
        OrderSide::Sell if stop >= current => {
            violations.push(Violation::new(
                "stop_price",
                "sell stop price must be below the current price",
            ));
        }
        _ => {}
    }
}

fn check_extended_hours(order: &Order, violations: &mut Vec<Violation>) {
    if !order.extended_hours {
        return;
    }
    if order.order_type != OrderType::Limit {
        violations.push(Violation::new(
            "extended_hours",
            "extended-hours orders must be limit orders",
        ));
    }
    if order.time_in_force != TimeInForce::Day {
        violations.push(Violation::new(
            "extended_hours",
            "extended-hours orders must have day time in force",
        ));
    }
}

fn check_tif_market_state(order: &Order, ctx: &ValidationContext, violations: &mut Vec<Violation>) {
    match order.time_in_force {
        TimeInForce::Opg if ctx.market_open => {
            violations.push(Violation::new(
                "time_in_force",
                "opg orders may only be submitted while the market is closed",
            ));
        }
        TimeInForce::Cls if !ctx.market_open => {
            violations.push(Violation::new(
                "time_in_force",
                "cls orders may only be submitted while the market is open",
            ));
        }
        _ => {}
    }
}

fn check_buying_power(order: &Order, ctx: &ValidationContext, violations: &mut Vec<Violation>) {
    if order.side != OrderSide::Buy {
        return;
    }
    let Some(cost) = estimated_cost(order, ctx.current_price) else {
        return;
    };
    if cost > ctx.buying_power {
        violations.push(Violation::new(
            "buying_power",
            format!(
                "estimated cost {cost} exceeds available buying power {}",
                ctx.buying_power
            ),
        ));
    }
}

/// Estimated cost of a buy order: notional when given, else quantity times
/// the order's reference price.
fn estimated_cost(order: &Order, current_price: Option<Decimal>) -> Option<Decimal> {
    if let Some(notional) = order.notional {
        return Some(notional);
    }
    let qty = order.qty?;
    let reference = match order.order_type {
        OrderType::Limit | OrderType::StopLimit => order.limit_price,
        OrderType::Stop => order.stop_price.or(current_price),
        OrderType::Market | OrderType::TrailingStop => current_price,
    }?;
    Some(qty * reference)
}

fn fraction_digits(price: Decimal) -> u32 {
    price.normalize().scale()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Order;
    use chrono::{TimeZone, Utc};

    fn ctx(current: Option<Decimal>, buying_power: Decimal, market_open: bool) -> ValidationContext {
        ValidationContext {
            current_price: current,
            buying_power,
            market_open,
        }
    }

    fn base_order(order_type: OrderType, side: OrderSide, tif: TimeInForce) -> Order {
        Order::new(
            "sess-1",
            "acct-1",
            "AAPL",
            side,
            order_type,
            tif,
            Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap(),
        )
        .with_qty(dec!(10))
    }

    #[test]
    fn market_buy_within_buying_power_is_clean() {
        let order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Day);
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.is_empty());
    }

    #[test]
    fn price_precision_two_digits_above_a_dollar() {
        let order = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(150.123));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "limit_price"));
    }

    #[test]
    fn price_precision_four_digits_below_a_dollar() {
        let ok = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(0.1234));
        assert!(validate(&ok, &ctx(Some(dec!(0.12)), dec!(100000), true)).is_empty());

        let bad = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(0.12345));
        let violations = validate(&bad, &ctx(Some(dec!(0.12)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "limit_price"));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let order = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(150.1000));
        assert!(validate(&order, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());
    }

    #[test]
    fn limit_requires_limit_price() {
        let order = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day);
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "limit_price"));
    }

    #[test]
    fn stop_limit_requires_both_prices() {
        let order = base_order(OrderType::StopLimit, OrderSide::Buy, TimeInForce::Day);
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "limit_price"));
        assert!(violations.iter().any(|v| v.field == "stop_price"));
    }

    #[test]
    fn trailing_stop_requires_exactly_one_trail_field() {
        let neither = base_order(OrderType::TrailingStop, OrderSide::Sell, TimeInForce::Day);
        assert!(!validate(&neither, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());

        let mut both = base_order(OrderType::TrailingStop, OrderSide::Sell, TimeInForce::Day);
        both.trail_price = Some(dec!(1));
        both.trail_percent = Some(dec!(2));
        assert!(!validate(&both, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());

        let mut one = base_order(OrderType::TrailingStop, OrderSide::Sell, TimeInForce::Day);
        one.trail_price = Some(dec!(1));
        assert!(validate(&one, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());
    }

    #[test]
    fn buy_stop_must_be_above_current() {
        let order = base_order(OrderType::Stop, OrderSide::Buy, TimeInForce::Day)
            .with_stop_price(dec!(149));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "stop_price"));
    }

    #[test]
    fn sell_stop_must_be_below_current() {
        let order = base_order(OrderType::Stop, OrderSide::Sell, TimeInForce::Day)
            .with_stop_price(dec!(151));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "stop_price"));
    }

    #[test]
    fn stop_direction_skipped_without_current_price() {
        let order = base_order(OrderType::Stop, OrderSide::Buy, TimeInForce::Day)
            .with_stop_price(dec!(149));
        // No bar data: direction cannot be checked, buying power falls back to stop.
        let violations = validate(&order, &ctx(None, dec!(100000), true));
        assert!(violations.is_empty());
    }

    #[test]
    fn extended_hours_requires_day_limit() {
        let mut order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Gtc);
        order.extended_hours = true;
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert_eq!(
            violations
                .iter()
                .filter(|v| v.field == "extended_hours")
                .count(),
            2
        );
    }

    #[test]
    fn opg_only_while_closed() {
        let order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Opg);
        assert!(!validate(&order, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());
        assert!(validate(&order, &ctx(Some(dec!(150)), dec!(100000), false)).is_empty());
    }

    #[test]
    fn cls_only_while_open() {
        let order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Cls);
        assert!(!validate(&order, &ctx(Some(dec!(150)), dec!(100000), false)).is_empty());
        assert!(validate(&order, &ctx(Some(dec!(150)), dec!(100000), true)).is_empty());
    }

    #[test]
    fn buying_power_uses_limit_price_reference() {
        let order = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(200));
        // 10 * 200 = 2000 > 1999
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(1999), true));
        assert!(violations.iter().any(Violation::is_buying_power));
    }

    #[test]
    fn sells_skip_buying_power() {
        let order = base_order(OrderType::Market, OrderSide::Sell, TimeInForce::Day);
        let violations = validate(&order, &ctx(Some(dec!(150)), Decimal::ZERO, true));
        assert!(violations.is_empty());
    }

    #[test]
    fn notional_is_its_own_estimate() {
        let mut order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Day);
        order.qty = None;
        order.notional = Some(dec!(5000));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(4999), true));
        assert!(violations.iter().any(Violation::is_buying_power));
    }

    #[test]
    fn notional_rejected_for_limit_orders() {
        let mut order = base_order(OrderType::Limit, OrderSide::Buy, TimeInForce::Day)
            .with_limit_price(dec!(100));
        order.qty = None;
        order.notional = Some(dec!(5000));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "notional"));
    }

    #[test]
    fn qty_and_notional_are_exclusive() {
        let mut order = base_order(OrderType::Market, OrderSide::Buy, TimeInForce::Day);
        order.notional = Some(dec!(5000));
        let violations = validate(&order, &ctx(Some(dec!(150)), dec!(100000), true));
        assert!(violations.iter().any(|v| v.field == "qty"));
    }

    #[test]
    fn stop_limit_premium_tiers() {
        // Below $50: 4% premium
        assert_eq!(stop_limit_premium(dec!(40)), dec!(41.60));
        // At or above $50: 2.5% premium
        assert_eq!(stop_limit_premium(dec!(50)), dec!(51.250));
        assert_eq!(stop_limit_premium(dec!(100)), dec!(102.500));
    }
}
