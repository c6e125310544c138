//! Account model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trading account owned by one session.
///
/// Invariants maintained by the account keeper after every operation:
/// `equity = cash + long_market_value - |short_market_value|`,
/// `cash_withdrawable = max(0, cash - initial_margin)`, `buying_power >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Settled cash.
    pub cash: Decimal,
    /// Cash available for withdrawal.
    pub cash_withdrawable: Decimal,
    /// Funds available to open new positions.
    pub buying_power: Decimal,
    /// Day-trading buying power (4x margin excess for flagged accounts).
    pub daytrading_buying_power: Decimal,
    /// Initial margin requirement.
    pub initial_margin: Decimal,
    /// Maintenance margin requirement.
    pub maintenance_margin: Decimal,
    /// Aggregate market value of long positions.
    pub long_market_value: Decimal,
    /// Aggregate market value of short positions (signed, non-positive).
    pub short_market_value: Decimal,
    /// Total account equity.
    pub equity: Decimal,
    /// Equity at the previous session day.
    pub last_equity: Decimal,
    /// Pattern-day-trader flag.
    pub pattern_day_trader: bool,
    /// Day trades within the rolling window.
    pub daytrade_count: u32,
    /// Trading disabled for this account.
    pub trading_blocked: bool,
    /// Account frozen entirely.
    pub account_blocked: bool,
    /// Transfers disabled.
    pub transfers_blocked: bool,
    /// Creation time (wall clock).
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new cash account funded with `initial_cash`.
    #[must_use]
    pub fn new(session_id: &str, initial_cash: Decimal) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            cash: initial_cash,
            cash_withdrawable: initial_cash,
            buying_power: initial_cash,
            daytrading_buying_power: initial_cash,
            initial_margin: Decimal::ZERO,
            maintenance_margin: Decimal::ZERO,
            long_market_value: Decimal::ZERO,
            short_market_value: Decimal::ZERO,
            equity: initial_cash,
            last_equity: initial_cash,
            pattern_day_trader: false,
            daytrade_count: 0,
            trading_blocked: false,
            account_blocked: false,
            transfers_blocked: false,
            created_at: Utc::now(),
        }
    }
}
