//! Order model and lifecycle states.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order - execute at the next available price.
    Market,
    /// Limit order - execute at the limit price or better.
    Limit,
    /// Stop order - becomes a market order when the stop price is reached.
    Stop,
    /// Stop-limit order - becomes a limit order when the stop price is reached.
    StopLimit,
    /// Trailing stop - stop price trails the market. Accepted at admission,
    /// not supported by the matching engine.
    TrailingStop,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
            Self::TrailingStop => "trailing_stop",
        };
        write!(f, "{s}")
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Valid for the submission day only.
    Day,
    /// Good-til-canceled; auto-expires after 90 days.
    Gtc,
    /// Execute at market open only.
    Opg,
    /// Execute at market close only.
    Cls,
    /// Immediate-or-cancel: fill what can be filled now, cancel the rest.
    Ioc,
    /// Fill-or-kill: full quantity immediately or reject.
    Fok,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Day => "day",
            Self::Gtc => "gtc",
            Self::Opg => "opg",
            Self::Cls => "cls",
            Self::Ioc => "ioc",
            Self::Fok => "fok",
        };
        write!(f, "{s}")
    }
}

/// Order status in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created but not yet submitted.
    New,
    /// Submission in flight.
    PendingNew,
    /// Order accepted and working.
    Accepted,
    /// Order partially filled.
    PartiallyFilled,
    /// Order completely filled. Terminal.
    Filled,
    /// Order done for the day. Terminal.
    DoneForDay,
    /// Order canceled. Terminal.
    Canceled,
    /// Order expired per its time in force. Terminal.
    Expired,
    /// Order replaced. Terminal.
    Replaced,
    /// Cancellation in flight.
    PendingCancel,
    /// Replacement in flight.
    PendingReplace,
    /// Order rejected. Terminal.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled
                | Self::DoneForDay
                | Self::Canceled
                | Self::Expired
                | Self::Replaced
                | Self::Rejected
        )
    }

    /// Returns true if the order is still working (may fill or expire).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::New | Self::PendingNew | Self::Accepted | Self::PartiallyFilled
        )
    }

    /// Returns true if the order may be canceled from this state.
    #[must_use]
    pub const fn is_cancelable(&self) -> bool {
        matches!(
            self,
            Self::New | Self::PendingNew | Self::Accepted | Self::PartiallyFilled
        )
    }

    /// Check if a lifecycle transition is valid. Terminal states admit none.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::New, Self::PendingNew | Self::Accepted | Self::Rejected | Self::Canceled)
                | (Self::PendingNew, Self::Accepted | Self::Rejected | Self::Canceled)
                | (
                    Self::Accepted,
                    Self::PartiallyFilled
                        | Self::Filled
                        | Self::PendingCancel
                        | Self::PendingReplace
                        | Self::Canceled
                        | Self::Expired
                        | Self::DoneForDay
                        | Self::Rejected
                )
                | (
                    Self::PartiallyFilled,
                    Self::PartiallyFilled
                        | Self::Filled
                        | Self::PendingCancel
                        | Self::PendingReplace
                        | Self::Canceled
                        | Self::Expired
                        | Self::DoneForDay
                        | Self::Rejected
                )
                | (
                    Self::PendingCancel,
                    Self::Canceled | Self::Filled | Self::PartiallyFilled
                )
                | (
                    Self::PendingReplace,
                    Self::Replaced | Self::Accepted | Self::PartiallyFilled
                )
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::PendingNew => "pending_new",
            Self::Accepted => "accepted",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::DoneForDay => "done_for_day",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Replaced => "replaced",
            Self::PendingCancel => "pending_cancel",
            Self::PendingReplace => "pending_replace",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// A single order owned by one account within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Owning account.
    pub account_id: String,
    /// Client-supplied idempotency key.
    pub client_order_id: Option<String>,
    /// Uppercase symbol.
    pub symbol: String,
    /// Requested share quantity. Exactly one of `qty`/`notional` is set at
    /// submission; notional market orders resolve `qty` at first fill.
    pub qty: Option<Decimal>,
    /// Requested dollar amount (market orders only).
    pub notional: Option<Decimal>,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price (limit / stop-limit).
    pub limit_price: Option<Decimal>,
    /// Stop price (stop / stop-limit).
    pub stop_price: Option<Decimal>,
    /// Trailing amount in dollars (trailing stop).
    pub trail_price: Option<Decimal>,
    /// Trailing amount in percent (trailing stop).
    pub trail_percent: Option<Decimal>,
    /// Eligible for extended-hours execution.
    pub extended_hours: bool,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_qty: Decimal,
    /// Volume-weighted average fill price over all fills.
    pub filled_avg_price: Option<Decimal>,
    /// Simulation time at submission.
    pub submitted_at: DateTime<Utc>,
    /// Simulation time of the final fill.
    pub filled_at: Option<DateTime<Utc>>,
    /// Simulation time of expiry.
    pub expired_at: Option<DateTime<Utc>>,
    /// Simulation time of cancellation.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Simulation time of rejection.
    pub failed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new order in `New` status.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        session_id: &str,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            account_id: account_id.to_string(),
            client_order_id: None,
            symbol: symbol.to_uppercase(),
            qty: None,
            notional: None,
            side,
            order_type,
            time_in_force,
            limit_price: None,
            stop_price: None,
            trail_price: None,
            trail_percent: None,
            extended_hours: false,
            status: OrderStatus::New,
            filled_qty: Decimal::ZERO,
            filled_avg_price: None,
            submitted_at,
            filled_at: None,
            expired_at: None,
            canceled_at: None,
            failed_at: None,
        }
    }

    /// Set the requested quantity.
    #[must_use]
    pub const fn with_qty(mut self, qty: Decimal) -> Self {
        self.qty = Some(qty);
        self
    }

    /// Set the requested notional.
    #[must_use]
    pub const fn with_notional(mut self, notional: Decimal) -> Self {
        self.notional = Some(notional);
        self
    }

    /// Set the limit price.
    #[must_use]
    pub const fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    /// Set the stop price.
    #[must_use]
    pub const fn with_stop_price(mut self, price: Decimal) -> Self {
        self.stop_price = Some(price);
        self
    }

    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Quantity still unfilled. Zero until a notional order resolves its
    /// quantity.
    #[must_use]
    pub fn remaining_qty(&self) -> Decimal {
        self.qty.map_or(Decimal::ZERO, |q| q - self.filled_qty)
    }

    /// Record a fill, updating the volume-weighted average price and the
    /// lifecycle status.
    pub fn record_fill(&mut self, fill_qty: Decimal, fill_price: Decimal, at: DateTime<Utc>) {
        let prior_notional = self
            .filled_avg_price
            .map_or(Decimal::ZERO, |avg| avg * self.filled_qty);
        let new_filled = self.filled_qty + fill_qty;
        if new_filled > Decimal::ZERO {
            self.filled_avg_price = Some((prior_notional + fill_qty * fill_price) / new_filled);
        }
        self.filled_qty = new_filled;

        if self.qty.is_some_and(|q| self.filled_qty >= q) {
            self.status = OrderStatus::Filled;
            self.filled_at = Some(at);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
    }
}
