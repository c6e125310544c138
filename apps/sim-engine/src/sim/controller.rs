//! Session orchestration: the single mutator of session state.
//!
//! Every operation serializes on a per-session async mutex and holds it
//! across store I/O, so observed mutations on one session are linearizable
//! while different sessions proceed in parallel. The mutex also guards the
//! session's day-trade record store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::SimError;
use crate::models::{
    Account, Bar, Order, OrderSide, OrderStatus, OrderType, Position, Quote, Resolution, Session,
    TimeInForce,
};
use crate::storage::{BarStore, RetryPolicy, SessionStore, with_retries};

use super::day_trades::{DayTradeTracker, TradeValidation};
use super::matching::{Fill, MatchOutcome};
use super::validator::{ValidationContext, Violation};
use super::{accounts, calendar, clock, matching, positions, validator};

/// Client-supplied idempotency ids are rejected as duplicates within this
/// window.
const CLIENT_ORDER_ID_DEDUP_HOURS: i64 = 24;

/// Wall-clock cadence of the playback driver.
const PLAYBACK_TICK_MILLIS: u64 = 250;

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Start of the simulation window.
    pub sim_start: DateTime<Utc>,
    /// End of the simulation window.
    pub sim_end: DateTime<Utc>,
    /// Cash each new account starts with.
    pub initial_cash: Decimal,
}

/// Parameters for submitting an order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Symbol, upper-cased at the boundary.
    pub symbol: String,
    /// Share quantity; exclusive with `notional`.
    pub qty: Option<Decimal>,
    /// Dollar amount; market orders only.
    pub notional: Option<Decimal>,
    /// Side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Stop price.
    pub stop_price: Option<Decimal>,
    /// Trailing amount in dollars.
    pub trail_price: Option<Decimal>,
    /// Trailing amount in percent.
    pub trail_percent: Option<Decimal>,
    /// Extended-hours eligibility.
    pub extended_hours: bool,
    /// Client idempotency id.
    pub client_order_id: Option<String>,
}

/// Mutable account fields exposed to PATCH.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    /// Replace the cash balance.
    pub cash: Option<Decimal>,
    /// Toggle the trading block.
    pub trading_blocked: Option<bool>,
}

/// How to move the session clock.
#[derive(Debug, Clone, Copy)]
pub enum AdvanceSpec {
    /// Advance by a duration.
    By(Duration),
    /// Advance to an absolute instant.
    To(DateTime<Utc>),
}

/// What one clock advancement did.
#[derive(Debug, Clone)]
pub struct AdvanceReport {
    /// Simulated time before the advancement.
    pub prev: DateTime<Utc>,
    /// Simulated time after the advancement.
    pub now: DateTime<Utc>,
    /// Orders that gained fills.
    pub filled: Vec<String>,
    /// Orders that expired per their time in force.
    pub expired: Vec<String>,
    /// Orders canceled (ioc).
    pub canceled: Vec<String>,
    /// Orders rejected at fill time (fok, trailing stops).
    pub rejected: Vec<String>,
}

impl AdvanceReport {
    fn new(prev: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            prev,
            now,
            filled: Vec::new(),
            expired: Vec::new(),
            canceled: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Per-session serializer plus the state it guards.
#[derive(Debug, Default)]
struct SessionSlot {
    state: AsyncMutex<DayTradeTracker>,
}

/// Orchestrates clock, validation, matching, and bookkeeping over the
/// stores. The only component that mutates session state.
pub struct SessionController<B, S> {
    bars: Arc<B>,
    store: Arc<S>,
    retry: RetryPolicy,
    slots: StdMutex<HashMap<String, Arc<SessionSlot>>>,
}

impl<B, S> SessionController<B, S>
where
    B: BarStore,
    S: SessionStore,
{
    /// Create a controller over the given stores.
    #[must_use]
    pub fn new(bars: Arc<B>, store: Arc<S>) -> Self {
        Self {
            bars,
            store,
            retry: RetryPolicy::default(),
            slots: StdMutex::new(HashMap::new()),
        }
    }

    fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(session_id.to_string()).or_default())
    }

    fn drop_slot(&self, session_id: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(session_id);
    }

    async fn load_session(&self, session_id: &str) -> Result<Session, SimError> {
        with_retries(&self.retry, || self.store.get_session(session_id))
            .await?
            .ok_or_else(|| SimError::NotFound(format!("session {session_id}")))
    }

    async fn load_account(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Account, SimError> {
        with_retries(&self.retry, || self.store.get_account(session_id, account_id))
            .await?
            .ok_or_else(|| SimError::NotFound(format!("account {account_id}")))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create a session owned by `owner_key`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an inverted window or negative initial cash.
    pub async fn create_session(
        &self,
        owner_key: &str,
        spec: SessionSpec,
    ) -> Result<Session, SimError> {
        if spec.sim_end < spec.sim_start {
            return Err(SimError::invalid_field(
                "sim_end",
                "sim_end must not precede sim_start",
            ));
        }
        if spec.initial_cash < Decimal::ZERO {
            return Err(SimError::invalid_field(
                "initial_cash",
                "initial_cash must be non-negative",
            ));
        }
        let session = Session::new(owner_key, spec.sim_start, spec.sim_end, spec.initial_cash);
        with_retries(&self.retry, || self.store.put_session(&session)).await?;
        tracing::info!(session_id = %session.id, owner = %owner_key, "session created");
        Ok(session)
    }

    /// Fetch a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, SimError> {
        self.load_session(session_id).await
    }

    /// List sessions owned by `owner_key`.
    ///
    /// # Errors
    ///
    /// Store errors propagate.
    pub async fn list_sessions(&self, owner_key: &str) -> Result<Vec<Session>, SimError> {
        with_retries(&self.retry, || self.store.list_sessions(owner_key)).await
    }

    /// Destroy a session, cascading to accounts, orders, and positions.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        self.load_session(session_id).await?;
        with_retries(&self.retry, || self.store.delete_session(session_id)).await?;
        drop(_guard);
        self.drop_slot(session_id);
        tracing::info!(session_id, "session deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account in a session, funded with the session's initial
    /// cash unless overridden.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session, `Conflict` when it is not active.
    pub async fn create_account(
        &self,
        session_id: &str,
        initial_cash: Option<Decimal>,
    ) -> Result<Account, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let session = self.load_session(session_id).await?;
        if !session.is_active() {
            return Err(SimError::Conflict("session is not active".to_string()));
        }
        let account = Account::new(session_id, initial_cash.unwrap_or(session.initial_cash));
        with_retries(&self.retry, || self.store.put_account(&account)).await?;
        Ok(account)
    }

    /// Fetch an account.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session or account.
    pub async fn get_account(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Account, SimError> {
        self.load_account(session_id, account_id).await
    }

    /// List a session's accounts.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session.
    pub async fn list_accounts(&self, session_id: &str) -> Result<Vec<Account>, SimError> {
        self.load_session(session_id).await?;
        with_retries(&self.retry, || self.store.list_accounts(session_id)).await
    }

    /// Patch mutable account fields.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn update_account(
        &self,
        session_id: &str,
        account_id: &str,
        update: AccountUpdate,
    ) -> Result<Account, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let mut account = self.load_account(session_id, account_id).await?;
        if let Some(cash) = update.cash {
            account.cash = cash;
        }
        if let Some(blocked) = update.trading_blocked {
            account.trading_blocked = blocked;
        }
        let positions =
            with_retries(&self.retry, || {
                self.store.list_positions(session_id, Some(account_id))
            })
            .await?;
        accounts::recalculate(&mut account, &accounts::totals(&positions));
        with_retries(&self.retry, || self.store.put_account(&account)).await?;
        Ok(account)
    }

    /// Delete an account and everything it owns.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn delete_account(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<(), SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        self.load_account(session_id, account_id).await?;
        with_retries(&self.retry, || {
            self.store.delete_account(session_id, account_id)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Submit an order: validate, persist, and for market orders with a
    /// current bar, fill immediately.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`/`InsufficientFunds`/`PdtViolation` on admission
    /// failure (the rejected order is persisted); `Conflict` for duplicate
    /// client ids or inactive sessions.
    pub async fn submit_order(
        &self,
        session_id: &str,
        account_id: &str,
        request: OrderRequest,
    ) -> Result<Order, SimError> {
        let slot = self.slot(session_id);
        let mut tracker = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;
        if !session.is_active() {
            return Err(SimError::Conflict("session is not active".to_string()));
        }
        let account = self.load_account(session_id, account_id).await?;
        if account.trading_blocked || account.account_blocked {
            return Err(SimError::Conflict("account is blocked".to_string()));
        }

        let symbol = request.symbol.to_uppercase();
        if let Some(client_id) = request.client_order_id.as_deref() {
            self.check_duplicate_client_id(&session, account_id, client_id)
                .await?;
        }

        let mut order = build_order(&session, account_id, &request, &symbol);

        let bar = self
            .bars
            .get_bar(&symbol, session.sim_now, Resolution::Minute)
            .await?;
        let ctx = ValidationContext {
            current_price: bar.as_ref().map(|b| b.close),
            buying_power: account.buying_power,
            market_open: calendar::is_market_open(session.sim_now),
        };

        let violations = validator::validate(&order, &ctx);
        if !violations.is_empty() {
            order.status = OrderStatus::Rejected;
            order.failed_at = Some(session.sim_now);
            with_retries(&self.retry, || self.store.put_order(&order)).await?;
            return Err(violations_to_error(&violations));
        }

        match tracker.validate_trade(
            account_id,
            &symbol,
            order.side,
            session.sim_now,
            account.equity,
        ) {
            TradeValidation::Rejected(reason) => {
                order.status = OrderStatus::Rejected;
                order.failed_at = Some(session.sim_now);
                with_retries(&self.retry, || self.store.put_order(&order)).await?;
                return Err(SimError::PdtViolation(reason));
            }
            TradeValidation::Warning(reason) => {
                tracing::warn!(order_id = %order.id, account_id, %reason, "day-trade warning");
            }
            TradeValidation::Allowed => {}
        }

        order.status = OrderStatus::Accepted;
        with_retries(&self.retry, || self.store.put_order(&order)).await?;
        tracing::info!(order_id = %order.id, %symbol, side = %order.side,
            order_type = %order.order_type, "order accepted");

        // Market orders execute against the current bar right away.
        if order.order_type == OrderType::Market {
            if let Some(bar) = bar {
                let now = session.sim_now;
                let outcome = matching::match_order(&order, Some(&bar), now)?;
                self.apply_outcome(&mut session, &mut tracker, &mut order, &outcome, now)
                    .await?;
                with_retries(&self.retry, || self.store.put_session(&session)).await?;
            }
        }

        Ok(order)
    }

    /// Cancel a working order.
    ///
    /// # Errors
    ///
    /// `Conflict` when the order is already terminal; `NotFound` for unknown
    /// ids.
    pub async fn cancel_order(&self, session_id: &str, order_id: &str) -> Result<Order, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let session = self.load_session(session_id).await?;
        let mut order = with_retries(&self.retry, || self.store.get_order(session_id, order_id))
            .await?
            .ok_or_else(|| SimError::NotFound(format!("order {order_id}")))?;
        if !order.status.is_cancelable() {
            return Err(SimError::Conflict(format!(
                "order in status {} cannot be canceled",
                order.status
            )));
        }
        order.status = OrderStatus::Canceled;
        order.canceled_at = Some(session.sim_now);
        with_retries(&self.retry, || self.store.put_order(&order)).await?;
        Ok(order)
    }

    /// Cancel every working order of one account. Returns the canceled ids.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn cancel_all_orders(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Vec<String>, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let session = self.load_session(session_id).await?;
        let orders = with_retries(&self.retry, || {
            self.store.list_orders(session_id, Some(account_id))
        })
        .await?;
        let mut canceled = Vec::new();
        for mut order in orders {
            if order.status.is_cancelable() {
                order.status = OrderStatus::Canceled;
                order.canceled_at = Some(session.sim_now);
                with_retries(&self.retry, || self.store.put_order(&order)).await?;
                canceled.push(order.id);
            }
        }
        Ok(canceled)
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn get_order(&self, session_id: &str, order_id: &str) -> Result<Order, SimError> {
        with_retries(&self.retry, || self.store.get_order(session_id, order_id))
            .await?
            .ok_or_else(|| SimError::NotFound(format!("order {order_id}")))
    }

    /// List an account's orders, newest first left to the store's ordering.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session.
    pub async fn list_orders(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Vec<Order>, SimError> {
        self.load_session(session_id).await?;
        with_retries(&self.retry, || {
            self.store.list_orders(session_id, Some(account_id))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    /// List an account's open positions.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session.
    pub async fn list_positions(
        &self,
        session_id: &str,
        account_id: &str,
    ) -> Result<Vec<Position>, SimError> {
        self.load_session(session_id).await?;
        with_retries(&self.retry, || {
            self.store.list_positions(session_id, Some(account_id))
        })
        .await
    }

    /// Fetch one position by symbol.
    ///
    /// # Errors
    ///
    /// `NotFound` when no open position exists.
    pub async fn get_position(
        &self,
        session_id: &str,
        account_id: &str,
        symbol: &str,
    ) -> Result<Position, SimError> {
        with_retries(&self.retry, || {
            self.store.get_position(session_id, account_id, symbol)
        })
        .await?
        .ok_or_else(|| SimError::NotFound(format!("position in {}", symbol.to_uppercase())))
    }

    /// Liquidating a position server-side is documented as unimplemented.
    ///
    /// # Errors
    ///
    /// Always `NotImplemented`.
    pub fn close_position(&self, _session_id: &str, symbol: &str) -> Result<(), SimError> {
        Err(SimError::NotImplemented(format!(
            "closing {symbol} positions server-side is not supported; submit an opposing order"
        )))
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Advance the session clock and process pending orders at the new time.
    ///
    /// # Errors
    ///
    /// Clock errors (`InvalidArgument`, `Conflict`) and store errors
    /// propagate.
    pub async fn advance_time(
        &self,
        session_id: &str,
        spec: AdvanceSpec,
    ) -> Result<AdvanceReport, SimError> {
        let slot = self.slot(session_id);
        let mut tracker = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;

        let (prev, now) = match spec {
            AdvanceSpec::By(d) => clock::advance_by(&mut session, d)?,
            AdvanceSpec::To(t) => clock::advance_to(&mut session, t)?,
        };

        let mut report = AdvanceReport::new(prev, now);
        self.settle_at_new_time(&mut session, &mut tracker, &mut report)
            .await?;
        Ok(report)
    }

    /// Start playback. The caller is responsible for driving `tick`, e.g.
    /// via [`spawn_playback`](Self::spawn_playback).
    ///
    /// # Errors
    ///
    /// `Conflict` when the session is not active.
    pub async fn play(&self, session_id: &str) -> Result<Session, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;
        clock::play(&mut session, Utc::now())?;
        with_retries(&self.retry, || self.store.put_session(&session)).await?;
        Ok(session)
    }

    /// Pause playback.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session.
    pub async fn pause(&self, session_id: &str) -> Result<Session, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;
        clock::pause(&mut session);
        with_retries(&self.retry, || self.store.put_session(&session)).await?;
        Ok(session)
    }

    /// Set the playback speed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a non-positive speed.
    pub async fn set_speed(&self, session_id: &str, speed: Decimal) -> Result<Session, SimError> {
        let slot = self.slot(session_id);
        let _guard = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;
        clock::set_speed(&mut session, speed)?;
        with_retries(&self.retry, || self.store.put_session(&session)).await?;
        Ok(session)
    }

    /// One playback tick: convert elapsed wall time into simulated time and
    /// settle orders. Used by the playback driver.
    ///
    /// # Errors
    ///
    /// `Conflict` when the session is paused or exhausted.
    pub async fn tick(&self, session_id: &str) -> Result<AdvanceReport, SimError> {
        let slot = self.slot(session_id);
        let mut tracker = slot.state.lock().await;
        let mut session = self.load_session(session_id).await?;
        let (prev, now) = clock::tick(&mut session, Utc::now())?;
        let mut report = AdvanceReport::new(prev, now);
        self.settle_at_new_time(&mut session, &mut tracker, &mut report)
            .await?;
        Ok(report)
    }

    /// Drive playback in the background until the session pauses, completes,
    /// or disappears. Best-effort; skew under load is acceptable.
    pub fn spawn_playback(self: Arc<Self>, session_id: String)
    where
        B: 'static,
        S: 'static,
    {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(PLAYBACK_TICK_MILLIS));
            loop {
                interval.tick().await;
                match self.tick(&session_id).await {
                    Ok(_) => {}
                    Err(SimError::Conflict(_) | SimError::NotFound(_)) => break,
                    Err(err) => {
                        tracing::warn!(session_id = %session_id, error = %err, "playback tick failed");
                    }
                }
            }
            tracing::debug!(session_id = %session_id, "playback driver stopped");
        });
    }

    // ------------------------------------------------------------------
    // Market data
    // ------------------------------------------------------------------

    /// Synthesize a quote from the bar at the session's current time.
    ///
    /// # Errors
    ///
    /// `NotFound` when no bar exists at or before `sim_now`.
    pub async fn quote(&self, session_id: &str, symbol: &str) -> Result<Quote, SimError> {
        let session = self.load_session(session_id).await?;
        let bar = self
            .bars
            .get_bar(symbol, session.sim_now, Resolution::Minute)
            .await?
            .ok_or_else(|| {
                SimError::NotFound(format!("no bar for {}", symbol.to_uppercase()))
            })?;
        Ok(Quote::from_bar(&bar))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn check_duplicate_client_id(
        &self,
        session: &Session,
        account_id: &str,
        client_id: &str,
    ) -> Result<(), SimError> {
        let existing = with_retries(&self.retry, || {
            self.store
                .find_order_by_client_id(&session.id, account_id, client_id)
        })
        .await?;
        if let Some(existing) = existing {
            let age = session.sim_now - existing.submitted_at;
            if age < Duration::hours(CLIENT_ORDER_ID_DEDUP_HOURS) {
                return Err(SimError::Conflict(format!(
                    "client_order_id {client_id} was already used within 24 hours"
                )));
            }
        }
        Ok(())
    }

    /// Run the matching batch at the session's (new) time and persist every
    /// consequence. Each order settles independently; one rejection never
    /// blocks the rest.
    async fn settle_at_new_time(
        &self,
        session: &mut Session,
        tracker: &mut DayTradeTracker,
        report: &mut AdvanceReport,
    ) -> Result<(), SimError> {
        let day_rolled = report.prev.date_naive() != report.now.date_naive();
        let orders =
            with_retries(&self.retry, || self.store.list_open_orders(&session.id)).await?;

        // Distinct symbols for orders and held positions, sorted for
        // deterministic store access.
        let all_positions =
            with_retries(&self.retry, || self.store.list_positions(&session.id, None)).await?;
        let symbols: BTreeSet<String> = orders
            .iter()
            .map(|o| o.symbol.clone())
            .chain(all_positions.iter().map(|p| p.symbol.clone()))
            .collect();
        let symbols: Vec<String> = symbols.into_iter().collect();
        let bars = self.bars.get_latest_bars(&symbols, session.sim_now).await?;

        let mut by_id: HashMap<String, Order> =
            orders.into_iter().map(|o| (o.id.clone(), o)).collect();
        let order_list: Vec<Order> = by_id.values().cloned().collect();
        let outcomes = matching::process_pending(&order_list, &bars, session.sim_now);

        let now = session.sim_now;
        for (order_id, outcome) in outcomes {
            let Some(order) = by_id.get_mut(&order_id) else {
                continue;
            };
            match &outcome {
                MatchOutcome::Fill(_) | MatchOutcome::FillThenCancel(_) => {
                    report.filled.push(order_id.clone());
                }
                MatchOutcome::Expire => report.expired.push(order_id.clone()),
                MatchOutcome::Cancel => report.canceled.push(order_id.clone()),
                MatchOutcome::Reject => report.rejected.push(order_id.clone()),
                MatchOutcome::NoAction => {}
            }
            self.apply_outcome(session, tracker, order, &outcome, now)
                .await?;
        }

        tracker.purge(now);
        self.refresh_marks(session, tracker, &bars, day_rolled).await?;
        with_retries(&self.retry, || self.store.put_session(session)).await?;
        Ok(())
    }

    /// Apply one match outcome to the order and, for fills, to the position,
    /// account, and day-trade records.
    async fn apply_outcome(
        &self,
        session: &mut Session,
        tracker: &mut DayTradeTracker,
        order: &mut Order,
        outcome: &MatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), SimError> {
        match outcome {
            MatchOutcome::NoAction => Ok(()),
            MatchOutcome::Fill(fill) => {
                self.apply_fill(session, tracker, order, fill, now).await?;
                with_retries(&self.retry, || self.store.put_order(order)).await
            }
            MatchOutcome::FillThenCancel(fill) => {
                self.apply_fill(session, tracker, order, fill, now).await?;
                if !order.status.is_terminal() {
                    order.status = OrderStatus::Canceled;
                    order.canceled_at = Some(now);
                }
                with_retries(&self.retry, || self.store.put_order(order)).await
            }
            MatchOutcome::Cancel => {
                order.status = OrderStatus::Canceled;
                order.canceled_at = Some(now);
                with_retries(&self.retry, || self.store.put_order(order)).await
            }
            MatchOutcome::Expire => {
                order.status = OrderStatus::Expired;
                order.expired_at = Some(now);
                with_retries(&self.retry, || self.store.put_order(order)).await
            }
            MatchOutcome::Reject => {
                order.status = OrderStatus::Rejected;
                order.failed_at = Some(now);
                with_retries(&self.retry, || self.store.put_order(order)).await
            }
        }
    }

    async fn apply_fill(
        &self,
        session: &mut Session,
        tracker: &mut DayTradeTracker,
        order: &mut Order,
        fill: &Fill,
        now: DateTime<Utc>,
    ) -> Result<(), SimError> {
        if order.qty.is_none() {
            order.qty = Some(fill.order_qty);
        }

        let mut account = self.load_account(&session.id, &order.account_id).await?;
        let mut position = with_retries(&self.retry, || {
            self.store
                .get_position(&session.id, &order.account_id, &order.symbol)
        })
        .await?
        .unwrap_or_else(|| Position::new(&session.id, &order.account_id, &order.symbol));

        let realized =
            positions::apply_fill(&mut position, fill.qty, fill.price, order.side);
        session.realized_pl += realized;

        let last_day = (position.last_day_price == Decimal::ZERO).then_some(fill.price);
        positions::update_prices(&mut position, fill.price, last_day);

        accounts::apply_fill(&mut account, fill.qty, fill.price, order.side);
        tracker.record(&order.account_id, &order.symbol, order.side, fill.qty, now);
        order.record_fill(fill.qty, fill.price, now);

        if position.is_flat() {
            with_retries(&self.retry, || {
                self.store
                    .delete_position(&session.id, &order.account_id, &order.symbol)
            })
            .await?;
        } else {
            with_retries(&self.retry, || self.store.put_position(&position)).await?;
        }

        let account_positions = with_retries(&self.retry, || {
            self.store.list_positions(&session.id, Some(&order.account_id))
        })
        .await?;
        let count = tracker.day_trade_count(&order.account_id, now);
        account.daytrade_count = u32::try_from(count).unwrap_or(u32::MAX);
        account.pattern_day_trader = DayTradeTracker::is_pattern_day_trader(count);
        accounts::recalculate(&mut account, &accounts::totals(&account_positions));
        with_retries(&self.retry, || self.store.put_account(&account)).await?;

        tracing::info!(order_id = %order.id, symbol = %order.symbol, side = %order.side,
            qty = %fill.qty, price = %fill.price, partial = fill.is_partial, "fill applied");
        Ok(())
    }

    /// Mark every position to the latest bar, roll day references, refresh
    /// account aggregates and PDT flags, and update session-level P&L.
    async fn refresh_marks(
        &self,
        session: &mut Session,
        tracker: &DayTradeTracker,
        bars: &HashMap<String, Bar>,
        day_rolled: bool,
    ) -> Result<(), SimError> {
        let accounts_list =
            with_retries(&self.retry, || self.store.list_accounts(&session.id)).await?;
        let mut session_unrealized = Decimal::ZERO;

        for mut account in accounts_list {
            let mut positions_list = with_retries(&self.retry, || {
                self.store.list_positions(&session.id, Some(&account.id))
            })
            .await?;

            for position in &mut positions_list {
                let Some(bar) = bars.get(&position.symbol) else {
                    continue;
                };
                let last_day = day_rolled.then_some(position.current_price);
                positions::update_prices(position, bar.close, last_day);
                with_retries(&self.retry, || self.store.put_position(position)).await?;
            }

            if day_rolled {
                account.last_equity = account.equity;
            }
            let count = tracker.day_trade_count(&account.id, session.sim_now);
            account.daytrade_count = u32::try_from(count).unwrap_or(u32::MAX);
            account.pattern_day_trader = DayTradeTracker::is_pattern_day_trader(count);

            let totals = accounts::totals(&positions_list);
            session_unrealized += totals.unrealized_pl;
            accounts::recalculate(&mut account, &totals);
            with_retries(&self.retry, || self.store.put_account(&account)).await?;
        }

        session.unrealized_pl = session_unrealized;
        Ok(())
    }
}

fn build_order(
    session: &Session,
    account_id: &str,
    request: &OrderRequest,
    symbol: &str,
) -> Order {
    let mut order = Order::new(
        &session.id,
        account_id,
        symbol,
        request.side,
        request.order_type,
        request.time_in_force,
        session.sim_now,
    );
    order.qty = request.qty;
    order.notional = request.notional;
    order.limit_price = request.limit_price;
    order.stop_price = request.stop_price;
    order.trail_price = request.trail_price;
    order.trail_percent = request.trail_percent;
    order.extended_hours = request.extended_hours;
    order.client_order_id = request.client_order_id.clone();
    order
}

/// Collapse validator violations into one response, first field highlighted.
/// Buying-power failures surface as `InsufficientFunds`.
fn violations_to_error(violations: &[Violation]) -> SimError {
    if let Some(bp) = violations.iter().find(|v| v.is_buying_power()) {
        return SimError::InsufficientFunds(bp.message.clone());
    }
    let message = violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ");
    SimError::InvalidArgument {
        message,
        field: violations.first().map(|v| v.field.clone()),
    }
}
