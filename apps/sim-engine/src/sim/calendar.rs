//! Market-hours helpers in US Eastern time.
//!
//! Regular session: weekdays 09:30-16:00 ET. These helpers are advisory;
//! the simulation clock itself is timezone-agnostic. Exchange holidays are
//! not modeled.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

const OPEN_MINUTE_OF_DAY: u32 = 9 * 60 + 30;
const CLOSE_MINUTE_OF_DAY: u32 = 16 * 60;

/// True when `t` falls on a weekday with ET time-of-day in `[09:30, 16:00)`.
#[must_use]
pub fn is_market_open(t: DateTime<Utc>) -> bool {
    let et = t.with_timezone(&New_York);
    if is_weekend(et.weekday()) {
        return false;
    }
    let minute_of_day = et.hour() * 60 + et.minute();
    (OPEN_MINUTE_OF_DAY..CLOSE_MINUTE_OF_DAY).contains(&minute_of_day)
}

const fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}
