//! Rolling-window day-trade counting and pattern-day-trader enforcement.
//!
//! FINRA-style rule: accounts under the equity minimum get three day trades
//! per five rolling days. A day trade is a buy and a sell on the same symbol
//! in one account on one day; multiple round-trips on a symbol-day collapse
//! into a single count.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::accounts::PDT_MIN_EQUITY;
use crate::models::OrderSide;

/// Day trades counted over this many rolling days.
const ROLLING_WINDOW_DAYS: i64 = 5;

/// Records older than this are purged.
const PURGE_AFTER_DAYS: i64 = 6;

/// Accounts at or above four day trades are flagged pattern day traders.
const PDT_FLAG_THRESHOLD: usize = 4;

/// Day trades allowed in the window for accounts under the equity minimum.
const MAX_DAY_TRADES_UNDER_MINIMUM: usize = 3;

/// One executed fill, as remembered by the tracker.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    /// Account the fill belongs to.
    pub account_id: String,
    /// Uppercase symbol.
    pub symbol: String,
    /// Fill side.
    pub side: OrderSide,
    /// Filled quantity.
    pub qty: Decimal,
    /// Simulated execution time.
    pub executed_at: DateTime<Utc>,
}

/// Verdict for a proposed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeValidation {
    /// Trade is fine.
    Allowed,
    /// Trade consumes the last day-trade allowance.
    Warning(String),
    /// Trade would exceed the day-trade limit.
    Rejected(String),
}

/// Per-session store of trade records, guarded by the session serializer.
#[derive(Debug, Default)]
pub struct DayTradeTracker {
    records: Vec<TradeRecord>,
}

impl DayTradeTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember one fill.
    pub fn record(
        &mut self,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        executed_at: DateTime<Utc>,
    ) {
        self.records.push(TradeRecord {
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side,
            qty,
            executed_at,
        });
    }

    /// Count day trades for an account within `[as_of - 5 days, as_of]`.
    ///
    /// A `(symbol, day)` group counts once when it contains both a buy and a
    /// sell, however many round-trips actually happened.
    #[must_use]
    pub fn day_trade_count(&self, account_id: &str, as_of: DateTime<Utc>) -> usize {
        let window_start = as_of - Duration::days(ROLLING_WINDOW_DAYS);
        let mut groups: BTreeMap<(&str, NaiveDate), (bool, bool)> = BTreeMap::new();

        for record in self.records.iter().filter(|r| {
            r.account_id == account_id
                && r.executed_at >= window_start
                && r.executed_at <= as_of
        }) {
            let day = record.executed_at.date_naive();
            let (bought, sold) = groups
                .entry((record.symbol.as_str(), day))
                .or_default();
            match record.side {
                OrderSide::Buy => *bought = true,
                OrderSide::Sell => *sold = true,
            }
        }

        groups.values().filter(|(b, s)| *b && *s).count()
    }

    /// Would a fill on this side complete a round-trip for
    /// `(account, symbol, day)`?
    #[must_use]
    pub fn would_be_day_trade(
        &self,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        t: DateTime<Utc>,
    ) -> bool {
        let day = t.date_naive();
        self.records.iter().any(|r| {
            r.account_id == account_id
                && r.symbol == symbol
                && r.side == side.opposite()
                && r.executed_at.date_naive() == day
        })
    }

    /// Admission check for a proposed trade against PDT limits.
    #[must_use]
    pub fn validate_trade(
        &self,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        t: DateTime<Utc>,
        equity: Decimal,
    ) -> TradeValidation {
        if !self.would_be_day_trade(account_id, symbol, side, t) || equity >= PDT_MIN_EQUITY {
            return TradeValidation::Allowed;
        }

        let count = self.day_trade_count(account_id, t);
        if count >= MAX_DAY_TRADES_UNDER_MINIMUM {
            return TradeValidation::Rejected(format!(
                "account has used {count} day trades in the rolling window and equity \
                 {equity} is below the {PDT_MIN_EQUITY} minimum"
            ));
        }
        if count == MAX_DAY_TRADES_UNDER_MINIMUM - 1 {
            return TradeValidation::Warning(format!(
                "this day trade is the last of {MAX_DAY_TRADES_UNDER_MINIMUM} allowed in the \
                 rolling window for accounts under the {PDT_MIN_EQUITY} equity minimum"
            ));
        }
        TradeValidation::Allowed
    }

    /// True when the count flags the account as a pattern day trader.
    #[must_use]
    pub const fn is_pattern_day_trader(count: usize) -> bool {
        count >= PDT_FLAG_THRESHOLD
    }

    /// Drop records older than six days. Purging never changes counts within
    /// the five-day window.
    pub fn purge(&mut self, as_of: DateTime<Utc>) {
        let cutoff = as_of - Duration::days(PURGE_AFTER_DAYS);
        self.records.retain(|r| r.executed_at >= cutoff);
    }

    /// Number of retained records (for tests and diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
