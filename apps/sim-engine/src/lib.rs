// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Sim Engine - Simulated Brokerage Core
//!
//! A deterministic brokerage simulator that replays historical OHLCV bars
//! against submitted orders. Clients create isolated sessions, each with its
//! own simulation clock, accounts, orders, and positions; the HTTP surface
//! mimics a well-known retail broker so client code targets the simulator
//! unchanged.
//!
//! # Layers
//!
//! - `models`: sessions, accounts, orders, positions, bars
//! - `sim`: the core state machine
//!   - `clock`: per-session simulated time, step / jump / playback
//!   - `validator`: static admission checks
//!   - `matching`: bar-by-bar fill simulation with slippage and volume caps
//!   - `positions` / `accounts`: P&L and balance bookkeeping
//!   - `day_trades`: rolling-window pattern-day-trader enforcement
//!   - `controller`: per-session serialized orchestration
//! - `storage`: bar-store and session-store contracts plus in-memory doubles
//! - `http`: axum adapter with the broker-compatible wire schema

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod sim;
pub mod storage;

pub use config::SimConfig;
pub use error::SimError;
pub use http::{ApiKey, ApiKeySet, AppState, create_router};
pub use models::{
    Account, Bar, Order, OrderSide, OrderStatus, OrderType, PlaybackState, Position, Quote,
    Resolution, Session, SessionStatus, TimeInForce,
};
pub use sim::{
    AdvanceReport, AdvanceSpec, OrderRequest, SessionController, SessionSpec,
};
pub use storage::{
    BarStore, InMemoryBarStore, InMemorySessionStore, RetryPolicy, SessionStore,
};
