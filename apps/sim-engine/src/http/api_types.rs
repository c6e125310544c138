//! Wire request and response types.
//!
//! Field names follow the well-known retail-broker schema: snake_case keys,
//! lowercase enum strings, monetary values as decimal strings (the decimal
//! type's native serde representation).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    Account, Bar, Order, OrderSide, OrderStatus, OrderType, PlaybackState, Position, PositionSide,
    Quote, Session, SessionStatus, TimeInForce,
};
use crate::sim::positions as position_math;

/// Wire error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code (class encodes the HTTP family).
    pub code: u32,
    /// Human-readable message.
    pub message: String,
    /// First offending field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// ============================================================================
// Sessions
// ============================================================================

/// Body of `POST /v1/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Start of the simulation window.
    pub sim_start: DateTime<Utc>,
    /// End of the simulation window.
    pub sim_end: DateTime<Utc>,
    /// Cash new accounts start with (default 100,000).
    #[serde(default)]
    pub initial_cash: Option<Decimal>,
}

/// Session representation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Session id.
    pub id: String,
    /// Owning API key name.
    pub owner_key: String,
    /// Window start.
    pub sim_start: DateTime<Utc>,
    /// Window end.
    pub sim_end: DateTime<Utc>,
    /// Current simulated time.
    pub sim_now: DateTime<Utc>,
    /// Playback state.
    pub playback: PlaybackState,
    /// Playback speed.
    pub speed: Decimal,
    /// Default account funding.
    pub initial_cash: Decimal,
    /// Aggregate realized P&L.
    pub realized_pl: Decimal,
    /// Aggregate unrealized P&L.
    pub unrealized_pl: Decimal,
    /// Session status.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            owner_key: session.owner_key.clone(),
            sim_start: session.sim_start,
            sim_end: session.sim_end,
            sim_now: session.sim_now,
            playback: session.playback,
            speed: session.speed,
            initial_cash: session.initial_cash,
            realized_pl: session.realized_pl,
            unrealized_pl: session.unrealized_pl,
            status: session.status,
            created_at: session.created_at,
        }
    }
}

/// Body of `POST /v1/sessions/{id}/time/advance`. Defaults to one minute.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvanceTimeRequest {
    /// Minutes to advance by.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Absolute instant to advance to; wins over `duration` when both given.
    #[serde(default)]
    pub target_time: Option<DateTime<Utc>>,
}

/// Result of a clock advancement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceTimeResponse {
    /// Simulated time before.
    pub prev_time: DateTime<Utc>,
    /// Simulated time after.
    pub new_time: DateTime<Utc>,
    /// Order ids that gained fills.
    pub filled_orders: Vec<String>,
    /// Order ids that expired.
    pub expired_orders: Vec<String>,
    /// Order ids canceled (ioc).
    pub canceled_orders: Vec<String>,
    /// Order ids rejected at fill time.
    pub rejected_orders: Vec<String>,
}

/// Body of `PUT /v1/sessions/{id}/time/speed`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeedRequest {
    /// New speed multiplier; must be positive.
    pub speed: Decimal,
}

// ============================================================================
// Accounts
// ============================================================================

/// Body of `POST /v1/accounts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAccountRequest {
    /// Override the session's default funding.
    #[serde(default)]
    pub initial_cash: Option<Decimal>,
}

/// Body of `PATCH /v1/accounts/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccountRequest {
    /// Replace the cash balance.
    #[serde(default)]
    pub cash: Option<Decimal>,
    /// Toggle the trading block.
    #[serde(default)]
    pub trading_blocked: Option<bool>,
}

/// Account representation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    /// Account id.
    pub id: String,
    /// Account number (mirrors the id).
    pub account_number: String,
    /// Owning session.
    pub session_id: String,
    /// Account status string.
    pub status: String,
    /// Denomination.
    pub currency: String,
    /// Settled cash.
    pub cash: Decimal,
    /// Withdrawable cash.
    pub cash_withdrawable: Decimal,
    /// Buying power.
    pub buying_power: Decimal,
    /// Day-trading buying power.
    pub daytrading_buying_power: Decimal,
    /// Initial margin.
    pub initial_margin: Decimal,
    /// Maintenance margin.
    pub maintenance_margin: Decimal,
    /// Long market value.
    pub long_market_value: Decimal,
    /// Short market value (signed).
    pub short_market_value: Decimal,
    /// Equity.
    pub equity: Decimal,
    /// Previous-day equity.
    pub last_equity: Decimal,
    /// Portfolio value (equals equity).
    pub portfolio_value: Decimal,
    /// Pattern-day-trader flag.
    pub pattern_day_trader: bool,
    /// Day trades in the rolling window.
    pub daytrade_count: u32,
    /// Trading blocked.
    pub trading_blocked: bool,
    /// Account blocked.
    pub account_blocked: bool,
    /// Transfers blocked.
    pub transfers_blocked: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            account_number: account.id.clone(),
            session_id: account.session_id.clone(),
            status: if account.account_blocked {
                "ACCOUNT_BLOCKED".to_string()
            } else {
                "ACTIVE".to_string()
            },
            currency: "USD".to_string(),
            cash: account.cash,
            cash_withdrawable: account.cash_withdrawable,
            buying_power: account.buying_power,
            daytrading_buying_power: account.daytrading_buying_power,
            initial_margin: account.initial_margin,
            maintenance_margin: account.maintenance_margin,
            long_market_value: account.long_market_value,
            short_market_value: account.short_market_value,
            equity: account.equity,
            last_equity: account.last_equity,
            portfolio_value: account.equity,
            pattern_day_trader: account.pattern_day_trader,
            daytrade_count: account.daytrade_count,
            trading_blocked: account.trading_blocked,
            account_blocked: account.account_blocked,
            transfers_blocked: account.transfers_blocked,
            created_at: account.created_at,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Body of `POST /v1/trading/accounts/{id}/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    /// Symbol.
    pub symbol: String,
    /// Share quantity; exclusive with `notional`.
    #[serde(default)]
    pub qty: Option<Decimal>,
    /// Dollar amount; market orders only.
    #[serde(default)]
    pub notional: Option<Decimal>,
    /// Side.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price.
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop price.
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Trail amount in dollars.
    #[serde(default)]
    pub trail_price: Option<Decimal>,
    /// Trail amount in percent.
    #[serde(default)]
    pub trail_percent: Option<Decimal>,
    /// Extended-hours eligibility.
    #[serde(default)]
    pub extended_hours: bool,
    /// Client idempotency id.
    #[serde(default)]
    pub client_order_id: Option<String>,
}

/// Order representation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Order id.
    pub id: String,
    /// Client idempotency id.
    pub client_order_id: Option<String>,
    /// Submission time (simulated).
    pub created_at: DateTime<Utc>,
    /// Submission time (simulated).
    pub submitted_at: DateTime<Utc>,
    /// Final fill time.
    pub filled_at: Option<DateTime<Utc>>,
    /// Expiry time.
    pub expired_at: Option<DateTime<Utc>>,
    /// Cancellation time.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Rejection time.
    pub failed_at: Option<DateTime<Utc>>,
    /// Symbol.
    pub symbol: String,
    /// Requested quantity.
    pub qty: Option<Decimal>,
    /// Requested notional.
    pub notional: Option<Decimal>,
    /// Cumulative filled quantity.
    pub filled_qty: Decimal,
    /// Volume-weighted average fill price.
    pub filled_avg_price: Option<Decimal>,
    /// Order class (always simple).
    pub order_class: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Side.
    pub side: OrderSide,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Stop price.
    pub stop_price: Option<Decimal>,
    /// Trail amount in dollars.
    pub trail_price: Option<Decimal>,
    /// Trail amount in percent.
    pub trail_percent: Option<Decimal>,
    /// Extended-hours eligibility.
    pub extended_hours: bool,
    /// Lifecycle status.
    pub status: OrderStatus,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            client_order_id: order.client_order_id.clone(),
            created_at: order.submitted_at,
            submitted_at: order.submitted_at,
            filled_at: order.filled_at,
            expired_at: order.expired_at,
            canceled_at: order.canceled_at,
            failed_at: order.failed_at,
            symbol: order.symbol.clone(),
            qty: order.qty,
            notional: order.notional,
            filled_qty: order.filled_qty,
            filled_avg_price: order.filled_avg_price,
            order_class: "simple".to_string(),
            order_type: order.order_type,
            side: order.side,
            time_in_force: order.time_in_force,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            trail_price: order.trail_price,
            trail_percent: order.trail_percent,
            extended_hours: order.extended_hours,
            status: order.status,
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Position representation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionResponse {
    /// Symbol.
    pub symbol: String,
    /// Signed quantity.
    pub qty: Decimal,
    /// Side string.
    pub side: PositionSide,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Market value.
    pub market_value: Decimal,
    /// Cost basis.
    pub cost_basis: Decimal,
    /// Unrealized P&L.
    pub unrealized_pl: Decimal,
    /// Unrealized P&L as a fraction of cost basis.
    pub unrealized_plpc: Decimal,
    /// Unrealized intraday P&L.
    pub unrealized_intraday_pl: Decimal,
    /// Latest price.
    pub current_price: Decimal,
    /// Previous-day price.
    pub lastday_price: Decimal,
    /// Fractional change since the previous day.
    pub change_today: Decimal,
}

impl From<&Position> for PositionResponse {
    fn from(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            qty: position.qty,
            side: position.side(),
            avg_entry_price: position.avg_entry_price,
            market_value: position.market_value,
            cost_basis: position.cost_basis(),
            unrealized_pl: position.unrealized_pl,
            unrealized_plpc: position_math::unrealized_plpc(position),
            unrealized_intraday_pl: position.unrealized_intraday_pl,
            current_price: position.current_price,
            lastday_price: position.last_day_price,
            change_today: position_math::change_today(position),
        }
    }
}

// ============================================================================
// Market data
// ============================================================================

/// Query string of `GET /v1/assets/{symbol}/bars`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BarsQuery {
    /// Timeframe string: 1Min, 5Min, 15Min, 1Hour, 1Day.
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Range start (inclusive).
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Range end (inclusive).
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of bars.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Single bar in the vendor's short-key format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarDto {
    /// Timestamp.
    pub t: DateTime<Utc>,
    /// Open.
    pub o: Decimal,
    /// High.
    pub h: Decimal,
    /// Low.
    pub l: Decimal,
    /// Close.
    pub c: Decimal,
    /// Volume.
    pub v: Decimal,
    /// Volume-weighted average price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vw: Option<Decimal>,
    /// Trade count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
}

impl From<&Bar> for BarDto {
    fn from(bar: &Bar) -> Self {
        Self {
            t: bar.timestamp,
            o: bar.open,
            h: bar.high,
            l: bar.low,
            c: bar.close,
            v: bar.volume,
            vw: bar.vwap,
            n: bar.trade_count,
        }
    }
}

/// Response of `GET /v1/assets/{symbol}/bars`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsResponse {
    /// Symbol.
    pub symbol: String,
    /// Bars, ascending.
    pub bars: Vec<BarDto>,
    /// Pagination token (never set; the store returns one page).
    pub next_page_token: Option<String>,
}

/// Latest-quote payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteDto {
    /// Timestamp.
    pub t: DateTime<Utc>,
    /// Bid price.
    pub bp: Decimal,
    /// Bid size.
    pub bs: u32,
    /// Ask price.
    pub ap: Decimal,
    /// Ask size.
    #[serde(rename = "as")]
    pub ask_size: u32,
}

/// Response of `GET /v1/assets/{symbol}/quotes/latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    /// Symbol.
    pub symbol: String,
    /// The quote.
    pub quote: QuoteDto,
}

impl From<&Quote> for QuoteResponse {
    fn from(quote: &Quote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            quote: QuoteDto {
                t: quote.timestamp,
                bp: quote.bid_price,
                bs: quote.bid_size,
                ap: quote.ask_price,
                ask_size: quote.ask_size,
            },
        }
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" when the process is serving.
    pub status: String,
    /// Crate version.
    pub version: String,
}
