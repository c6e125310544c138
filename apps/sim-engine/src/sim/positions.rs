//! Position bookkeeping: applying fills and refreshing mark-to-market state.

use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;

use crate::models::{OrderSide, Position};

/// Apply one fill to a position, updating signed quantity and average entry
/// price. Returns the realized profit and loss of any closed quantity.
///
/// Cost basis is kept FIFO-style: reducing a position leaves the average
/// entry price unchanged; flipping through zero re-bases the residual at the
/// fill price.
pub fn apply_fill(
    position: &mut Position,
    fill_qty: Decimal,
    fill_price: Decimal,
    side: OrderSide,
) -> Decimal {
    let signed_fill = match side {
        OrderSide::Buy => fill_qty,
        OrderSide::Sell => -fill_qty,
    };
    let old_qty = position.qty;
    let new_qty = old_qty + signed_fill;

    // Opening from flat
    if old_qty == Decimal::ZERO {
        position.qty = new_qty;
        position.avg_entry_price = fill_price;
        return Decimal::ZERO;
    }

    // Adding to the position on the same side
    if old_qty.signum() == signed_fill.signum() {
        let combined = old_qty.abs() + fill_qty;
        position.avg_entry_price =
            (old_qty.abs() * position.avg_entry_price + fill_qty * fill_price) / combined;
        position.qty = new_qty;
        return Decimal::ZERO;
    }

    // Opposite side: some quantity closes
    let closed_qty = old_qty.abs().min(fill_qty);
    let realized = closed_qty * (fill_price - position.avg_entry_price) * old_qty.signum();

    if new_qty == Decimal::ZERO {
        // Full close
        position.qty = Decimal::ZERO;
        position.avg_entry_price = Decimal::ZERO;
    } else if new_qty.signum() == old_qty.signum() {
        // Partial reduction keeps the entry basis
        position.qty = new_qty;
    } else {
        // Flip: the residual takes the fill price as its basis
        position.qty = new_qty;
        position.avg_entry_price = fill_price;
    }
    realized
}

/// Refresh mark-to-market fields from the latest price. `last_day_price` is
/// only replaced when a new day reference is supplied.
pub fn update_prices(
    position: &mut Position,
    current_price: Decimal,
    last_day_price: Option<Decimal>,
) {
    position.current_price = current_price;
    if let Some(last_day) = last_day_price {
        position.last_day_price = last_day;
    }
    position.market_value = position.qty * current_price;
    position.unrealized_pl =
        position.market_value - position.cost_basis() * position.qty.signum();
    position.unrealized_intraday_pl =
        position.qty.abs() * (current_price - position.last_day_price);
}

/// Fractional price change since the previous day; zero when the reference
/// price is zero.
#[must_use]
pub fn change_today(position: &Position) -> Decimal {
    if position.last_day_price == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (position.current_price - position.last_day_price) / position.last_day_price
}

/// Unrealized P&L as a fraction of cost basis; zero for a flat position.
#[must_use]
pub fn unrealized_plpc(position: &Position) -> Decimal {
    let basis = position.cost_basis();
    if basis == Decimal::ZERO {
        return Decimal::ZERO;
    }
    position.unrealized_pl / basis
}
