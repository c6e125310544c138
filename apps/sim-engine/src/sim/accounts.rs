//! Account bookkeeping: cash movement on fills and aggregate recalculation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{Account, OrderSide, Position};

/// Minimum equity exempting an account from pattern-day-trader limits.
pub const PDT_MIN_EQUITY: Decimal = dec!(25000);

/// Margin multiplier applied to short-sale requirements over the ask.
const SHORT_ASK_MULTIPLIER: Decimal = dec!(1.03);

/// Day-trading buying power multiplier for flagged accounts.
const DAYTRADE_MULTIPLIER: Decimal = dec!(4);

/// Aggregate market values across an account's positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionTotals {
    /// Sum of long position market values (non-negative).
    pub long_market_value: Decimal,
    /// Sum of short position market values (signed, non-positive).
    pub short_market_value: Decimal,
    /// Sum of unrealized P&L.
    pub unrealized_pl: Decimal,
}

/// Fold a position list into long/short totals.
#[must_use]
pub fn totals(positions: &[Position]) -> PositionTotals {
    let mut acc = PositionTotals::default();
    for position in positions {
        if position.qty >= Decimal::ZERO {
            acc.long_market_value += position.market_value;
        } else {
            acc.short_market_value += position.market_value;
        }
        acc.unrealized_pl += position.unrealized_pl;
    }
    acc
}

/// Move cash for one fill: buys debit, sells credit.
pub fn apply_fill(account: &mut Account, fill_qty: Decimal, fill_price: Decimal, side: OrderSide) {
    let notional = fill_qty * fill_price;
    match side {
        OrderSide::Buy => account.cash -= notional,
        OrderSide::Sell => account.cash += notional,
    }
}

/// Cash requirement to open a short: `max(limit_price, 1.03 * ask) * qty`.
#[must_use]
pub fn short_sale_requirement(
    limit_price: Option<Decimal>,
    current_ask: Decimal,
    qty: Decimal,
) -> Decimal {
    limit_price
        .unwrap_or(Decimal::ZERO)
        .max(SHORT_ASK_MULTIPLIER * current_ask)
        * qty
}

/// Refresh account aggregates from position totals.
///
/// This is a simplified cash account: buying power equals cash. Flagged
/// pattern day traders get four times their margin excess as day-trading
/// buying power.
pub fn recalculate(account: &mut Account, totals: &PositionTotals) {
    account.long_market_value = totals.long_market_value;
    account.short_market_value = totals.short_market_value;
    account.equity =
        account.cash + totals.long_market_value - totals.short_market_value.abs();
    account.buying_power = account.cash.max(Decimal::ZERO);
    account.daytrading_buying_power = if account.pattern_day_trader {
        (DAYTRADE_MULTIPLIER * (account.equity - account.maintenance_margin)).max(Decimal::ZERO)
    } else {
        account.buying_power
    };
    account.cash_withdrawable = (account.cash - account.initial_margin).max(Decimal::ZERO);
}

/// True when equity clears the pattern-day-trader minimum.
#[must_use]
pub fn meets_pdt_minimum(account: &Account) -> bool {
    account.equity >= PDT_MIN_EQUITY
}
