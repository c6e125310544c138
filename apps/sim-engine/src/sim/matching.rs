//! Order fill simulation against single bars.
//!
//! Matching is pure: given an order and the bar at the session's simulated
//! time, decide whether and how the order fills. No cross-order price impact
//! is simulated; each order sees the bar as if it were alone.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::SimError;
use crate::models::{Bar, Order, OrderSide, OrderType, TimeInForce};

/// Fraction of a bar's range applied as adverse slippage.
const SLIPPAGE_FRACTION: Decimal = dec!(0.10);

/// Fraction of a bar's volume one order may consume.
const VOLUME_PARTICIPATION: Decimal = dec!(0.01);

/// Good-til-canceled orders expire this many days after submission.
const GTC_EXPIRY_DAYS: i64 = 90;

/// Fractional shares are kept to 9 decimal places.
const QTY_SCALE: u32 = 9;

/// One fill produced by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    /// Execution price, inside the bar's range.
    pub price: Decimal,
    /// Quantity filled from this bar.
    pub qty: Decimal,
    /// Total order quantity; resolves notional orders at first fill.
    pub order_qty: Decimal,
    /// True when the participation cap truncated the fill.
    pub is_partial: bool,
}

/// What the matching engine decided for one order on one advancement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Nothing happened; the order keeps working.
    NoAction,
    /// The order filled (fully, or partially under the participation cap).
    Fill(Fill),
    /// The order filled partially and its remainder is canceled (ioc).
    FillThenCancel(Fill),
    /// The order is canceled without a fill (ioc with no fill).
    Cancel,
    /// The order expired per its time in force.
    Expire,
    /// The order is rejected at fill time (fok that cannot fill in full).
    Reject,
}

/// Can this bar fill the order at all?
///
/// # Errors
///
/// `NotImplemented` for trailing stops, which are declared but not matched.
pub fn can_fill(order: &Order, bar: &Bar) -> Result<bool, SimError> {
    let met = match (order.order_type, order.side) {
        (OrderType::Market, _) => true,
        (OrderType::Limit, OrderSide::Buy) => {
            order.limit_price.is_some_and(|limit| bar.low <= limit)
        }
        (OrderType::Limit, OrderSide::Sell) => {
            order.limit_price.is_some_and(|limit| bar.high >= limit)
        }
        (OrderType::Stop, OrderSide::Buy) => {
            order.stop_price.is_some_and(|stop| bar.high >= stop)
        }
        (OrderType::Stop, OrderSide::Sell) => {
            order.stop_price.is_some_and(|stop| bar.low <= stop)
        }
        (OrderType::StopLimit, OrderSide::Buy) => {
            order.stop_price.is_some_and(|stop| bar.high >= stop)
                && order.limit_price.is_some_and(|limit| bar.low <= limit)
        }
        (OrderType::StopLimit, OrderSide::Sell) => {
            order.stop_price.is_some_and(|stop| bar.low <= stop)
                && order.limit_price.is_some_and(|limit| bar.high >= limit)
        }
        (OrderType::TrailingStop, _) => {
            return Err(SimError::NotImplemented(
                "trailing-stop orders are not matched".to_string(),
            ));
        }
    };
    Ok(met)
}

/// Theoretical execution price before slippage.
///
/// # Errors
///
/// `NotImplemented` for trailing stops; `Internal` when a required price is
/// missing (admission should have rejected the order).
pub fn execution_price(order: &Order, bar: &Bar) -> Result<Decimal, SimError> {
    let missing =
        |field: &str| SimError::Internal(format!("order {} is missing {field}", order.id));
    match (order.order_type, order.side) {
        (OrderType::Market, _) => Ok(bar.open),
        (OrderType::Limit | OrderType::StopLimit, _) => {
            order.limit_price.ok_or_else(|| missing("limit_price"))
        }
        (OrderType::Stop, OrderSide::Buy) => order
            .stop_price
            .map(|stop| bar.open.max(stop))
            .ok_or_else(|| missing("stop_price")),
        (OrderType::Stop, OrderSide::Sell) => order
            .stop_price
            .map(|stop| bar.open.min(stop))
            .ok_or_else(|| missing("stop_price")),
        (OrderType::TrailingStop, _) => Err(SimError::NotImplemented(
            "trailing-stop orders are not matched".to_string(),
        )),
    }
}

/// Apply adverse slippage of `0.10 * range` and clamp into the bar's range.
/// Flat bars slip nothing.
#[must_use]
pub fn apply_slippage(price: Decimal, side: OrderSide, bar: &Bar) -> Decimal {
    let range = bar.range();
    if range == Decimal::ZERO {
        return price;
    }
    let slip = SLIPPAGE_FRACTION * range;
    match side {
        OrderSide::Buy => bar.high.min(price + slip),
        OrderSide::Sell => bar.low.max(price - slip),
    }
}

/// Maximum quantity one order may take from one bar.
#[must_use]
pub fn participation_cap(bar: &Bar) -> Decimal {
    VOLUME_PARTICIPATION * bar.volume
}

/// Match one active order against the bar (if any) at `now`.
///
/// TIF expiry is checked first, then price condition, slippage, and the
/// volume participation cap.
///
/// # Errors
///
/// `NotImplemented` when a trailing stop reaches the fill path.
pub fn match_order(
    order: &Order,
    bar: Option<&Bar>,
    now: DateTime<Utc>,
) -> Result<MatchOutcome, SimError> {
    if is_expired(order, now) {
        return Ok(MatchOutcome::Expire);
    }

    let Some(bar) = bar else {
        return Ok(match order.time_in_force {
            TimeInForce::Ioc => MatchOutcome::Cancel,
            TimeInForce::Fok => MatchOutcome::Reject,
            _ => MatchOutcome::NoAction,
        });
    };

    if order.time_in_force == TimeInForce::Fok {
        return match_fok(order, bar);
    }

    if !can_fill(order, bar)? {
        return Ok(if order.time_in_force == TimeInForce::Ioc {
            MatchOutcome::Cancel
        } else {
            MatchOutcome::NoAction
        });
    }

    let price = executed_price(order, bar)?;
    let order_qty = resolve_order_qty(order, price);
    let remaining = order_qty - order.filled_qty;
    if remaining <= Decimal::ZERO {
        return Ok(MatchOutcome::NoAction);
    }

    let cap = participation_cap(bar);
    let (qty, is_partial) = if remaining > cap && cap > Decimal::ZERO {
        (cap, true)
    } else {
        (remaining, false)
    };

    let fill = Fill {
        price,
        qty,
        order_qty,
        is_partial,
    };
    Ok(if order.time_in_force == TimeInForce::Ioc && is_partial {
        MatchOutcome::FillThenCancel(fill)
    } else {
        MatchOutcome::Fill(fill)
    })
}

/// Process every active order of one session against the latest bars.
///
/// Iteration order is deterministic: ascending `submitted_at`, ties broken by
/// order id. A per-order failure (the trailing-stop hole) rejects that order
/// without disturbing the rest.
#[must_use]
pub fn process_pending(
    orders: &[Order],
    bars_by_symbol: &HashMap<String, Bar>,
    now: DateTime<Utc>,
) -> Vec<(String, MatchOutcome)> {
    let mut ordered: Vec<&Order> = orders.iter().filter(|o| o.status.is_active()).collect();
    ordered.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut outcomes = Vec::with_capacity(ordered.len());
    for order in ordered {
        let bar = bars_by_symbol.get(&order.symbol);
        match match_order(order, bar, now) {
            Ok(outcome) => outcomes.push((order.id.clone(), outcome)),
            Err(err) => {
                tracing::warn!(order_id = %order.id, symbol = %order.symbol, error = %err,
                    "order rejected during matching");
                outcomes.push((order.id.clone(), MatchOutcome::Reject));
            }
        }
    }
    outcomes
}

/// Fill-or-kill: the price condition must hold and the participation cap
/// must admit the full remaining quantity, else reject without a fill.
fn match_fok(order: &Order, bar: &Bar) -> Result<MatchOutcome, SimError> {
    if !can_fill(order, bar)? {
        return Ok(MatchOutcome::Reject);
    }
    let price = executed_price(order, bar)?;
    let order_qty = resolve_order_qty(order, price);
    let remaining = order_qty - order.filled_qty;
    if remaining <= Decimal::ZERO {
        return Ok(MatchOutcome::NoAction);
    }
    if remaining > participation_cap(bar) {
        return Ok(MatchOutcome::Reject);
    }
    Ok(MatchOutcome::Fill(Fill {
        price,
        qty: remaining,
        order_qty,
        is_partial: false,
    }))
}

/// Final execution price: market-style executions (market, stop) slip
/// adversely within the bar; limit-priced executions fill at the limit
/// exactly.
fn executed_price(order: &Order, bar: &Bar) -> Result<Decimal, SimError> {
    let theoretical = execution_price(order, bar)?;
    Ok(match order.order_type {
        OrderType::Market | OrderType::Stop => apply_slippage(theoretical, order.side, bar),
        _ => theoretical,
    })
}

/// Total order quantity; notional orders resolve against the execution price
/// at first fill.
fn resolve_order_qty(order: &Order, price: Decimal) -> Decimal {
    order.qty.unwrap_or_else(|| {
        order
            .notional
            .map_or(Decimal::ZERO, |notional| {
                if price > Decimal::ZERO {
                    (notional / price).round_dp(QTY_SCALE)
                } else {
                    Decimal::ZERO
                }
            })
    })
}

/// Day orders (and opg/cls, which match as day orders) expire once the
/// simulated date passes the submission date; gtc expires 90 days out.
fn is_expired(order: &Order, now: DateTime<Utc>) -> bool {
    match order.time_in_force {
        TimeInForce::Day | TimeInForce::Opg | TimeInForce::Cls => {
            now.date_naive() > order.submitted_at.date_naive()
        }
        TimeInForce::Gtc => now >= order.submitted_at + Duration::days(GTC_EXPIRY_DAYS),
        TimeInForce::Ioc | TimeInForce::Fok => false,
    }
}
