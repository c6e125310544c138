//! Position model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Long position (positive quantity).
    Long,
    /// Short position (negative quantity).
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// One symbol's open position within one account.
///
/// `qty` is signed: positive long, negative short. A flat position has
/// `qty = 0` and `avg_entry_price = 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Owning account.
    pub account_id: String,
    /// Uppercase symbol.
    pub symbol: String,
    /// Signed quantity.
    pub qty: Decimal,
    /// Average entry price of the open quantity.
    pub avg_entry_price: Decimal,
    /// Latest known price.
    pub current_price: Decimal,
    /// Closing price of the previous session day.
    pub last_day_price: Decimal,
    /// Signed market value (`qty * current_price`).
    pub market_value: Decimal,
    /// Unrealized profit and loss.
    pub unrealized_pl: Decimal,
    /// Unrealized intraday profit and loss.
    pub unrealized_intraday_pl: Decimal,
}

impl Position {
    /// Create a flat position for `symbol`.
    #[must_use]
    pub fn new(session_id: &str, account_id: &str, symbol: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            account_id: account_id.to_string(),
            symbol: symbol.to_uppercase(),
            qty: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            last_day_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_pl: Decimal::ZERO,
            unrealized_intraday_pl: Decimal::ZERO,
        }
    }

    /// Position side derived from the quantity sign.
    #[must_use]
    pub fn side(&self) -> PositionSide {
        if self.qty < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Long
        }
    }

    /// Original invested amount: `|qty| * avg_entry_price`.
    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        self.qty.abs() * self.avg_entry_price
    }

    /// True when no quantity is open.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.qty == Decimal::ZERO
    }
}
