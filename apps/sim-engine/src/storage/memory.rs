//! In-memory store implementations for development and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SimError;
use crate::models::{Account, Bar, Order, Position, Resolution, Session};

use super::{BarStore, SessionStore};

/// In-memory bar store keyed by symbol and timestamp.
///
/// Stores a single bar series per symbol; the resolution argument is accepted
/// for contract compatibility but not used to aggregate.
#[derive(Debug, Default)]
pub struct InMemoryBarStore {
    series: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, Bar>>>,
}

impl InMemoryBarStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one bar, replacing any bar at the same timestamp.
    pub fn insert(&self, bar: Bar) {
        let mut series = self
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        series
            .entry(bar.symbol.to_uppercase())
            .or_default()
            .insert(bar.timestamp, bar);
    }

    /// Insert many bars.
    pub fn insert_all(&self, bars: impl IntoIterator<Item = Bar>) {
        for bar in bars {
            self.insert(bar);
        }
    }
}

#[async_trait]
impl BarStore for InMemoryBarStore {
    async fn get_bar(
        &self,
        symbol: &str,
        as_of: DateTime<Utc>,
        _resolution: Resolution,
    ) -> Result<Option<Bar>, SimError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series.get(&symbol.to_uppercase()).and_then(|bars| {
            bars.range(..=as_of).next_back().map(|(_, bar)| bar.clone())
        }))
    }

    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<Bar>, SimError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series
            .get(&symbol.to_uppercase())
            .map(|bars| {
                bars.range(start..=end)
                    .take(limit)
                    .map(|(_, bar)| bar.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_latest_bars(
        &self,
        symbols: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<String, Bar>, SimError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut latest = HashMap::new();
        for symbol in symbols {
            let key = symbol.to_uppercase();
            if let Some(bar) = series
                .get(&key)
                .and_then(|bars| bars.range(..=as_of).next_back())
                .map(|(_, bar)| bar.clone())
            {
                latest.insert(key, bar);
            }
        }
        Ok(latest)
    }
}

/// Everything one session owns.
#[derive(Debug, Default)]
struct SessionPartition {
    session: Option<Session>,
    accounts: HashMap<String, Account>,
    orders: HashMap<String, Order>,
    /// Keyed by `(account_id, symbol)`.
    positions: HashMap<(String, String), Position>,
}

/// In-memory session store partitioned by session id.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    partitions: RwLock<HashMap<String, SessionPartition>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put_session(&self, session: &Session) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(session.id.clone())
            .or_default()
            .session = Some(session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions
            .get(session_id)
            .and_then(|p| p.session.clone()))
    }

    async fn list_sessions(&self, owner_key: &str) -> Result<Vec<Session>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut sessions: Vec<Session> = partitions
            .values()
            .filter_map(|p| p.session.clone())
            .filter(|s| s.owner_key == owner_key)
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions.remove(session_id);
        Ok(())
    }

    async fn put_account(&self, account: &Account) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(account.session_id.clone())
            .or_default()
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Option<Account>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions
            .get(session_id)
            .and_then(|p| p.accounts.get(account_id).cloned()))
    }

    async fn list_accounts(&self, session_id: &str) -> Result<Vec<Account>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut accounts: Vec<Account> = partitions
            .get(session_id)
            .map(|p| p.accounts.values().cloned().collect())
            .unwrap_or_default();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn delete_account(&self, session_id: &str, account_id: &str) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(partition) = partitions.get_mut(session_id) {
            partition.accounts.remove(account_id);
            partition.orders.retain(|_, o| o.account_id != account_id);
            partition
                .positions
                .retain(|(owner, _), _| owner != account_id);
        }
        Ok(())
    }

    async fn put_order(&self, order: &Order) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(order.session_id.clone())
            .or_default()
            .orders
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(
        &self,
        session_id: &str,
        order_id: &str,
    ) -> Result<Option<Order>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions
            .get(session_id)
            .and_then(|p| p.orders.get(order_id).cloned()))
    }

    async fn list_orders(
        &self,
        session_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Order>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut orders: Vec<Order> = partitions
            .get(session_id)
            .map(|p| {
                p.orders
                    .values()
                    .filter(|o| account_id.is_none_or(|id| o.account_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        orders.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(orders)
    }

    async fn list_open_orders(&self, session_id: &str) -> Result<Vec<Order>, SimError> {
        let mut orders = self.list_orders(session_id, None).await?;
        orders.retain(|o| o.status.is_active());
        Ok(orders)
    }

    async fn find_order_by_client_id(
        &self,
        session_id: &str,
        account_id: &str,
        client_order_id: &str,
    ) -> Result<Option<Order>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions.get(session_id).and_then(|p| {
            p.orders
                .values()
                .filter(|o| {
                    o.account_id == account_id
                        && o.client_order_id.as_deref() == Some(client_order_id)
                })
                .max_by_key(|o| o.submitted_at)
                .cloned()
        }))
    }

    async fn put_position(&self, position: &Position) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(position.session_id.clone())
            .or_default()
            .positions
            .insert(
                (position.account_id.clone(), position.symbol.to_uppercase()),
                position.clone(),
            );
        Ok(())
    }

    async fn get_position(
        &self,
        session_id: &str,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions.get(session_id).and_then(|p| {
            p.positions
                .get(&(account_id.to_string(), symbol.to_uppercase()))
                .cloned()
        }))
    }

    async fn list_positions(
        &self,
        session_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Position>, SimError> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut positions: Vec<Position> = partitions
            .get(session_id)
            .map(|p| {
                p.positions
                    .values()
                    .filter(|pos| account_id.is_none_or(|id| pos.account_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        positions.sort_by(|a, b| {
            a.account_id
                .cmp(&b.account_id)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Ok(positions)
    }

    async fn delete_position(
        &self,
        session_id: &str,
        account_id: &str,
        symbol: &str,
    ) -> Result<(), SimError> {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(partition) = partitions.get_mut(session_id) {
            partition
                .positions
                .remove(&(account_id.to_string(), symbol.to_uppercase()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar_at(minute: u32, close: rust_decimal::Decimal) -> Bar {
        Bar {
            symbol: "AAPL".to_string(),
            timestamp: Utc.with_ymd_and_hms(2023, 1, 3, 14, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            vwap: None,
            trade_count: None,
        }
    }

    #[tokio::test]
    async fn get_bar_returns_latest_at_or_before() {
        let store = InMemoryBarStore::new();
        store.insert(bar_at(30, dec!(150)));
        store.insert(bar_at(31, dec!(151)));
        store.insert(bar_at(35, dec!(155)));

        let at = Utc.with_ymd_and_hms(2023, 1, 3, 14, 33, 0).unwrap();
        let bar = store
            .get_bar("aapl", at, Resolution::Minute)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bar.close, dec!(151));

        let before_all = Utc.with_ymd_and_hms(2023, 1, 3, 14, 0, 0).unwrap();
        assert!(
            store
                .get_bar("AAPL", before_all, Resolution::Minute)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn get_bars_is_ascending_and_limited() {
        let store = InMemoryBarStore::new();
        for minute in [35, 31, 30, 33] {
            store.insert(bar_at(minute, dec!(150)));
        }
        let start = Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 3, 14, 40, 0).unwrap();
        let bars = store
            .get_bars("AAPL", start, end, Resolution::Minute, 3)
            .await
            .unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn latest_bars_skips_unknown_symbols() {
        let store = InMemoryBarStore::new();
        store.insert(bar_at(30, dec!(150)));
        let at = Utc.with_ymd_and_hms(2023, 1, 3, 15, 0, 0).unwrap();
        let map = store
            .get_latest_bars(&["AAPL".to_string(), "MSFT".to_string()], at)
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn session_cascade_delete() {
        let store = InMemorySessionStore::new();
        let session = Session::new(
            "key",
            Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 4, 21, 0, 0).unwrap(),
            dec!(100000),
        );
        store.put_session(&session).await.unwrap();

        let account = Account::new(&session.id, dec!(100000));
        store.put_account(&account).await.unwrap();

        let order = Order::new(
            &session.id,
            &account.id,
            "AAPL",
            crate::models::OrderSide::Buy,
            crate::models::OrderType::Market,
            crate::models::TimeInForce::Day,
            session.sim_now,
        )
        .with_qty(dec!(10));
        store.put_order(&order).await.unwrap();

        store.delete_session(&session.id).await.unwrap();
        assert!(store.get_session(&session.id).await.unwrap().is_none());
        assert!(
            store
                .get_account(&session.id, &account.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get_order(&session.id, &order.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn account_delete_cascades_orders_and_positions() {
        let store = InMemorySessionStore::new();
        let session = Session::new(
            "key",
            Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 4, 21, 0, 0).unwrap(),
            dec!(100000),
        );
        store.put_session(&session).await.unwrap();
        let account = Account::new(&session.id, dec!(100000));
        store.put_account(&account).await.unwrap();

        let position = Position::new(&session.id, &account.id, "AAPL");
        store.put_position(&position).await.unwrap();

        store.delete_account(&session.id, &account.id).await.unwrap();
        assert!(
            store
                .list_positions(&session.id, Some(&account.id))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn position_writes_normalize_symbol_case() {
        let store = InMemorySessionStore::new();
        let mut position = Position::new("sess-1", "acct-1", "AAPL");
        position.symbol = "aapl".to_string();
        store.put_position(&position).await.unwrap();

        assert!(
            store
                .get_position("sess-1", "acct-1", "AAPL")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_position("sess-1", "acct-1", "aapl")
                .await
                .unwrap()
                .is_some()
        );

        store.delete_position("sess-1", "acct-1", "aapl").await.unwrap();
        assert!(
            store
                .get_position("sess-1", "acct-1", "AAPL")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn find_order_by_client_id_returns_latest() {
        let store = InMemorySessionStore::new();
        let t0 = Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap();
        let mut first = Order::new(
            "sess-1",
            "acct-1",
            "AAPL",
            crate::models::OrderSide::Buy,
            crate::models::OrderType::Market,
            crate::models::TimeInForce::Day,
            t0,
        );
        first.client_order_id = Some("client-1".to_string());
        let mut second = first.clone();
        second.id = "other".to_string();
        second.submitted_at = t0 + chrono::Duration::hours(1);
        store.put_order(&first).await.unwrap();
        store.put_order(&second).await.unwrap();

        let found = store
            .find_order_by_client_id("sess-1", "acct-1", "client-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "other");
    }

    #[tokio::test]
    async fn list_open_orders_filters_terminal() {
        let store = InMemorySessionStore::new();
        let t0 = Utc.with_ymd_and_hms(2023, 1, 3, 14, 30, 0).unwrap();
        let mut active = Order::new(
            "sess-1",
            "acct-1",
            "AAPL",
            crate::models::OrderSide::Buy,
            crate::models::OrderType::Market,
            crate::models::TimeInForce::Day,
            t0,
        );
        active.status = crate::models::OrderStatus::Accepted;
        let mut done = active.clone();
        done.id = "done".to_string();
        done.status = crate::models::OrderStatus::Filled;
        store.put_order(&active).await.unwrap();
        store.put_order(&done).await.unwrap();

        let open = store.list_open_orders("sess-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, active.id);
    }
}
