//! Session model: the unit of isolation for one simulated brokerage run.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback state of the session clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Clock advances only on explicit requests.
    Paused,
    /// Clock advances with wall time scaled by `speed`.
    Playing,
    /// Single step requested.
    StepPending,
}

/// Overall session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is live.
    Active,
    /// Clock reached the end of the window.
    Completed,
    /// Session was cancelled by the owner.
    Cancelled,
}

/// An isolated simulation run with its own clock, accounts, orders, and
/// positions.
///
/// Invariant: `sim_start <= sim_now <= sim_end`, and `sim_now` never
/// decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Name of the API key that created the session.
    pub owner_key: String,
    /// Start of the simulation window.
    pub sim_start: DateTime<Utc>,
    /// End of the simulation window.
    pub sim_end: DateTime<Utc>,
    /// Current simulated time.
    pub sim_now: DateTime<Utc>,
    /// Playback state.
    pub playback: PlaybackState,
    /// Playback speed multiplier (simulated seconds per wall second).
    pub speed: Decimal,
    /// Cash each new account starts with.
    pub initial_cash: Decimal,
    /// Aggregate realized profit and loss across accounts.
    pub realized_pl: Decimal,
    /// Aggregate unrealized profit and loss across accounts.
    pub unrealized_pl: Decimal,
    /// Session status.
    pub status: SessionStatus,
    /// Wall-clock reference for playback; set by `play`, refreshed per tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Creation time (wall clock).
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create an active session with the clock at `sim_start`.
    #[must_use]
    pub fn new(
        owner_key: &str,
        sim_start: DateTime<Utc>,
        sim_end: DateTime<Utc>,
        initial_cash: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_key: owner_key.to_string(),
            sim_start,
            sim_end,
            sim_now: sim_start,
            playback: PlaybackState::Paused,
            speed: Decimal::ONE,
            initial_cash,
            realized_pl: Decimal::ZERO,
            unrealized_pl: Decimal::ZERO,
            status: SessionStatus::Active,
            last_tick_at: None,
            created_at: Utc::now(),
        }
    }

    /// True while the session accepts mutations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }
}
