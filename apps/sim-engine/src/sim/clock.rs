//! Per-session simulation clock.
//!
//! The clock owns nothing; it mutates the `Session` it is handed. Callers
//! hold the session serializer while doing so.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::SimError;
use crate::models::{PlaybackState, Session, SessionStatus};

/// Advance the clock by a non-negative duration, clamping to `sim_end`.
///
/// Returns `(previous, new)` simulated time.
///
/// # Errors
///
/// `InvalidArgument` for a negative duration; `Conflict` when the clock is
/// already at `sim_end`.
pub fn advance_by(
    session: &mut Session,
    d: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SimError> {
    if d < Duration::zero() {
        return Err(SimError::invalid_field(
            "duration",
            "duration must be non-negative",
        ));
    }
    if session.sim_now >= session.sim_end {
        return Err(SimError::Conflict(
            "session has reached the end of its simulation window".to_string(),
        ));
    }

    let prev = session.sim_now;
    let target = (prev + d).min(session.sim_end);
    session.sim_now = target;
    if session.sim_now >= session.sim_end {
        session.status = SessionStatus::Completed;
        session.playback = PlaybackState::Paused;
    }
    Ok((prev, target))
}

/// Advance the clock to an absolute instant, clamping to `sim_end`.
///
/// # Errors
///
/// `InvalidArgument` when `t` lies before `sim_now` or before `sim_start`.
pub fn advance_to(
    session: &mut Session,
    t: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SimError> {
    if t < session.sim_start {
        return Err(SimError::invalid_field(
            "target_time",
            "target time lies before the session window",
        ));
    }
    if t < session.sim_now {
        return Err(SimError::invalid_field(
            "target_time",
            "the session clock cannot move backwards",
        ));
    }

    let prev = session.sim_now;
    let target = t.min(session.sim_end);
    session.sim_now = target;
    if session.sim_now >= session.sim_end {
        session.status = SessionStatus::Completed;
        session.playback = PlaybackState::Paused;
    }
    Ok((prev, target))
}

/// Convert the wall-clock delta since the last tick into simulated time and
/// advance. Playback is best-effort; skew under load is acceptable.
///
/// # Errors
///
/// `Conflict` when the session is not playing or the clock is exhausted.
pub fn tick(
    session: &mut Session,
    wall_now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SimError> {
    if session.playback != PlaybackState::Playing {
        return Err(SimError::Conflict("session is not playing".to_string()));
    }

    let reference = session.last_tick_at.unwrap_or(wall_now);
    let wall_delta = wall_now.signed_duration_since(reference).max(Duration::zero());
    session.last_tick_at = Some(wall_now);

    let sim_millis = (Decimal::from(wall_delta.num_milliseconds()) * session.speed)
        .trunc()
        .to_i64()
        .unwrap_or(0);
    advance_by(session, Duration::milliseconds(sim_millis))
}

/// Start playback, snapshotting the wall-clock reference.
///
/// # Errors
///
/// `Conflict` when the session is no longer active.
pub fn play(session: &mut Session, wall_now: DateTime<Utc>) -> Result<(), SimError> {
    if !session.is_active() {
        return Err(SimError::Conflict(
            "session is not active".to_string(),
        ));
    }
    session.playback = PlaybackState::Playing;
    session.last_tick_at = Some(wall_now);
    Ok(())
}

/// Pause playback.
pub fn pause(session: &mut Session) {
    session.playback = PlaybackState::Paused;
    session.last_tick_at = None;
}

/// Set the playback speed multiplier.
///
/// # Errors
///
/// `InvalidArgument` when `speed <= 0`.
pub fn set_speed(session: &mut Session, speed: Decimal) -> Result<(), SimError> {
    if speed <= Decimal::ZERO {
        return Err(SimError::invalid_field(
            "speed",
            "speed must be greater than zero",
        ));
    }
    session.speed = speed;
    Ok(())
}
