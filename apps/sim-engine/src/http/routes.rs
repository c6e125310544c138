//! Axum routes for the versioned HTTP surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::SimError;
use crate::models::Resolution;
use crate::sim::{
    AccountUpdate, AdvanceSpec, OrderRequest, SessionController, SessionSpec,
};
use crate::storage::{BarStore, SessionStore};

use super::api_types::{
    AccountResponse, AdvanceTimeRequest, AdvanceTimeResponse, BarDto, BarsQuery, BarsResponse,
    CreateAccountRequest, CreateOrderRequest, CreateSessionRequest, HealthResponse, OrderResponse,
    PositionResponse, QuoteResponse, SessionResponse, SpeedRequest, UpdateAccountRequest,
};
use super::auth::ApiKeySet;

/// Default funding for sessions that omit `initial_cash`.
const DEFAULT_INITIAL_CASH: Decimal = dec!(100000);

/// Default bar page size.
const DEFAULT_BAR_LIMIT: usize = 1000;

/// Shared state behind every handler.
pub struct AppState<B, S> {
    /// The session controller.
    pub controller: Arc<SessionController<B, S>>,
    /// Direct bar-store handle for market-data endpoints.
    pub bars: Arc<B>,
    /// Accepted API keys.
    pub auth: Arc<ApiKeySet>,
    /// Reported version.
    pub version: String,
}

impl<B, S> Clone for AppState<B, S> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            bars: Arc::clone(&self.bars),
            auth: Arc::clone(&self.auth),
            version: self.version.clone(),
        }
    }
}

/// Build the router with every `/v1` endpoint.
pub fn create_router<B, S>(state: AppState<B, S>) -> Router
where
    B: BarStore + 'static,
    S: SessionStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route(
            "/v1/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/v1/sessions/{id}/time/advance", post(advance_time))
        .route("/v1/sessions/{id}/time/play", post(play))
        .route("/v1/sessions/{id}/time/pause", post(pause))
        .route("/v1/sessions/{id}/time/speed", put(set_speed))
        .route("/v1/accounts", post(create_account).get(list_accounts))
        .route(
            "/v1/accounts/{id}",
            get(get_account).patch(update_account).delete(delete_account),
        )
        .route(
            "/v1/trading/accounts/{id}/orders",
            post(submit_order).get(list_orders).delete(cancel_all_orders),
        )
        .route(
            "/v1/trading/accounts/{id}/orders/{order_id}",
            get(get_order).delete(cancel_order),
        )
        .route(
            "/v1/trading/accounts/{id}/positions",
            get(list_positions),
        )
        .route(
            "/v1/trading/accounts/{id}/positions/{symbol}",
            get(get_position).delete(close_position),
        )
        .route("/v1/assets/{symbol}/bars", get(get_bars))
        .route("/v1/assets/{symbol}/quotes/latest", get(latest_quote))
        .with_state(state)
}

fn authenticate<'a, B, S>(
    state: &'a AppState<B, S>,
    headers: &HeaderMap,
) -> Result<&'a super::auth::ApiKey, SimError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state.auth.verify(authorization)
}

fn session_header(headers: &HeaderMap) -> Result<String, SimError> {
    headers
        .get("X-Session-Id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| SimError::invalid_field("X-Session-Id", "missing X-Session-Id header"))
}

fn parse_timeframe(timeframe: Option<&str>) -> Result<Resolution, SimError> {
    match timeframe.unwrap_or("1Min") {
        "1Min" | "5Min" | "15Min" => Ok(Resolution::Minute),
        "1Hour" => Ok(Resolution::Hour),
        "1Day" => Ok(Resolution::Day),
        other => Err(SimError::invalid_field(
            "timeframe",
            format!("unsupported timeframe {other}"),
        )),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health<B, S>(State(state): State<AppState<B, S>>) -> Json<HealthResponse>
where
    B: BarStore,
    S: SessionStore,
{
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version,
    })
}

async fn create_session<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    let key = authenticate(&state, &headers)?;
    let session = state
        .controller
        .create_session(
            &key.name,
            SessionSpec {
                sim_start: request.sim_start,
                sim_end: request.sim_end,
                initial_cash: request.initial_cash.unwrap_or(DEFAULT_INITIAL_CASH),
            },
        )
        .await?;
    Ok(Json(SessionResponse::from(&session)))
}

async fn list_sessions<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionResponse>>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    let key = authenticate(&state, &headers)?;
    let sessions = state.controller.list_sessions(&key.name).await?;
    Ok(Json(sessions.iter().map(SessionResponse::from).collect()))
}

async fn get_session<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    let key = authenticate(&state, &headers)?;
    let session = state.controller.get_session(&id).await?;
    if session.owner_key != key.name {
        return Err(SimError::NotFound(format!("session {id}")));
    }
    Ok(Json(SessionResponse::from(&session)))
}

async fn delete_session<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    let key = authenticate(&state, &headers)?;
    let session = state.controller.get_session(&id).await?;
    if session.owner_key != key.name {
        return Err(SimError::NotFound(format!("session {id}")));
    }
    state.controller.delete_session(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn advance_time<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<AdvanceTimeRequest>>,
) -> Result<Json<AdvanceTimeResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let spec = if let Some(target) = request.target_time {
        AdvanceSpec::To(target)
    } else {
        AdvanceSpec::By(Duration::minutes(request.duration.unwrap_or(1)))
    };
    let report = state.controller.advance_time(&id, spec).await?;
    Ok(Json(AdvanceTimeResponse {
        prev_time: report.prev,
        new_time: report.now,
        filled_orders: report.filled,
        expired_orders: report.expired,
        canceled_orders: report.canceled,
        rejected_orders: report.rejected,
    }))
}

async fn play<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, SimError>
where
    B: BarStore + 'static,
    S: SessionStore + 'static,
{
    authenticate(&state, &headers)?;
    let session = state.controller.play(&id).await?;
    Arc::clone(&state.controller).spawn_playback(id);
    Ok(Json(SessionResponse::from(&session)))
}

async fn pause<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session = state.controller.pause(&id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

async fn set_speed<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<SpeedRequest>,
) -> Result<Json<SessionResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session = state.controller.set_speed(&id, request.speed).await?;
    Ok(Json(SessionResponse::from(&session)))
}

async fn create_account<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    body: Option<Json<CreateAccountRequest>>,
) -> Result<Json<AccountResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let account = state
        .controller
        .create_account(&session_id, request.initial_cash)
        .await?;
    Ok(Json(AccountResponse::from(&account)))
}

async fn list_accounts<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AccountResponse>>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let accounts = state.controller.list_accounts(&session_id).await?;
    Ok(Json(accounts.iter().map(AccountResponse::from).collect()))
}

async fn get_account<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let account = state.controller.get_account(&session_id, &id).await?;
    Ok(Json(AccountResponse::from(&account)))
}

async fn update_account<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let account = state
        .controller
        .update_account(
            &session_id,
            &id,
            AccountUpdate {
                cash: request.cash,
                trading_blocked: request.trading_blocked,
            },
        )
        .await?;
    Ok(Json(AccountResponse::from(&account)))
}

async fn delete_account<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    state.controller.delete_account(&session_id, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn submit_order<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(account_id): Path<String>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let order = state
        .controller
        .submit_order(
            &session_id,
            &account_id,
            OrderRequest {
                symbol: request.symbol,
                qty: request.qty,
                notional: request.notional,
                side: request.side,
                order_type: request.order_type,
                time_in_force: request.time_in_force,
                limit_price: request.limit_price,
                stop_price: request.stop_price,
                trail_price: request.trail_price,
                trail_percent: request.trail_percent,
                extended_hours: request.extended_hours,
                client_order_id: request.client_order_id,
            },
        )
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

async fn list_orders<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let orders = state.controller.list_orders(&session_id, &account_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

async fn get_order<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path((account_id, order_id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let order = state.controller.get_order(&session_id, &order_id).await?;
    if order.account_id != account_id {
        return Err(SimError::NotFound(format!("order {order_id}")));
    }
    Ok(Json(OrderResponse::from(&order)))
}

async fn cancel_order<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path((account_id, order_id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let order = state.controller.get_order(&session_id, &order_id).await?;
    if order.account_id != account_id {
        return Err(SimError::NotFound(format!("order {order_id}")));
    }
    let order = state.controller.cancel_order(&session_id, &order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

async fn cancel_all_orders<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(account_id): Path<String>,
) -> Result<Json<serde_json::Value>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let canceled = state
        .controller
        .cancel_all_orders(&session_id, &account_id)
        .await?;
    Ok(Json(serde_json::json!({ "canceled": canceled })))
}

async fn list_positions<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<PositionResponse>>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let positions = state
        .controller
        .list_positions(&session_id, &account_id)
        .await?;
    Ok(Json(positions.iter().map(PositionResponse::from).collect()))
}

async fn get_position<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path((account_id, symbol)): Path<(String, String)>,
) -> Result<Json<PositionResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let position = state
        .controller
        .get_position(&session_id, &account_id, &symbol)
        .await?;
    Ok(Json(PositionResponse::from(&position)))
}

async fn close_position<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path((_account_id, symbol)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    state.controller.close_position(&session_id, &symbol)?;
    Ok(Json(serde_json::json!({})))
}

async fn get_bars<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
    Query(query): Query<BarsQuery>,
) -> Result<Json<BarsResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let resolution = parse_timeframe(query.timeframe.as_deref())?;
    let start = query.start.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let end = query.end.unwrap_or_else(Utc::now);
    let limit = query.limit.unwrap_or(DEFAULT_BAR_LIMIT);
    let bars = state
        .bars
        .get_bars(&symbol, start, end, resolution, limit)
        .await?;
    Ok(Json(BarsResponse {
        symbol: symbol.to_uppercase(),
        bars: bars.iter().map(BarDto::from).collect(),
        next_page_token: None,
    }))
}

async fn latest_quote<B, S>(
    State(state): State<AppState<B, S>>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
) -> Result<Json<QuoteResponse>, SimError>
where
    B: BarStore,
    S: SessionStore,
{
    authenticate(&state, &headers)?;
    let session_id = session_header(&headers)?;
    let quote = state.controller.quote(&session_id, &symbol).await?;
    Ok(Json(QuoteResponse::from(&quote)))
}
