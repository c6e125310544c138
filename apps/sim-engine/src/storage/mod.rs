//! Storage contracts consumed by the simulation core.
//!
//! The bar store is shared, read-only market data; the session store holds
//! durable per-session state with a read-modify-write pattern, partitioned
//! by session id. Both are async ports; the in-memory implementations back
//! development and tests.

pub mod memory;
pub mod retry;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SimError;
use crate::models::{Account, Bar, Order, Position, Resolution, Session};

pub use memory::{InMemoryBarStore, InMemorySessionStore};
pub use retry::{RetryPolicy, with_retries};

/// Read-only time-series bar storage.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Latest bar for `symbol` at or before `as_of`, if any.
    async fn get_bar(
        &self,
        symbol: &str,
        as_of: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Option<Bar>, SimError>;

    /// Bars for `symbol` in `[start, end]`, ascending, at most `limit`.
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Bar>, SimError>;

    /// Latest bar per symbol at or before `as_of`. Symbols with no bar are
    /// absent from the map.
    async fn get_latest_bars(
        &self,
        symbols: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<String, Bar>, SimError>;
}

/// Durable per-session state: sessions, accounts, orders, positions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session.
    async fn put_session(&self, session: &Session) -> Result<(), SimError>;

    /// Fetch a session by id.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, SimError>;

    /// All sessions belonging to `owner_key`.
    async fn list_sessions(&self, owner_key: &str) -> Result<Vec<Session>, SimError>;

    /// Delete a session and cascade to its accounts, orders, and positions.
    async fn delete_session(&self, session_id: &str) -> Result<(), SimError>;

    /// Insert or replace an account.
    async fn put_account(&self, account: &Account) -> Result<(), SimError>;

    /// Fetch an account within a session.
    async fn get_account(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Option<Account>, SimError>;

    /// All accounts of a session.
    async fn list_accounts(&self, session_id: &str) -> Result<Vec<Account>, SimError>;

    /// Delete an account and cascade to its orders and positions.
    async fn delete_account(&self, session_id: &str, account_id: &str) -> Result<(), SimError>;

    /// Insert or replace an order.
    async fn put_order(&self, order: &Order) -> Result<(), SimError>;

    /// Fetch an order within a session.
    async fn get_order(&self, session_id: &str, order_id: &str)
    -> Result<Option<Order>, SimError>;

    /// Orders of a session, optionally restricted to one account.
    async fn list_orders(
        &self,
        session_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Order>, SimError>;

    /// Non-terminal orders of a session.
    async fn list_open_orders(&self, session_id: &str) -> Result<Vec<Order>, SimError>;

    /// Find an order by its client-supplied idempotency id.
    async fn find_order_by_client_id(
        &self,
        session_id: &str,
        account_id: &str,
        client_order_id: &str,
    ) -> Result<Option<Order>, SimError>;

    /// Insert or replace a position (keyed by account and symbol).
    async fn put_position(&self, position: &Position) -> Result<(), SimError>;

    /// Fetch one position by account and symbol.
    async fn get_position(
        &self,
        session_id: &str,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, SimError>;

    /// Positions of a session, optionally restricted to one account.
    async fn list_positions(
        &self,
        session_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Position>, SimError>;

    /// Remove a position (used when it goes flat).
    async fn delete_position(
        &self,
        session_id: &str,
        account_id: &str,
        symbol: &str,
    ) -> Result<(), SimError>;
}
