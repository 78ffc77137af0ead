//! Naive market-hours guard for the live path.
//!
//! Fixed UTC-5 offset standing in for US/Eastern, weekday 0-4 (Mon-Fri),
//! 09:30-16:00. Ignores DST transitions and exchange holidays — a
//! placeholder until the live path consults a real exchange calendar.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

const EASTERN_OFFSET_HOURS: i64 = -5;
const OPEN_MINUTES: u32 = 9 * 60 + 30;
const CLOSE_MINUTES: u32 = 16 * 60;

pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let eastern = now + Duration::hours(EASTERN_OFFSET_HOURS);
    if eastern.weekday().num_days_from_monday() > 4 {
        return false;
    }
    let minutes_since_midnight = eastern.hour() * 60 + eastern.minute();
    (OPEN_MINUTES..CLOSE_MINUTES).contains(&minutes_since_midnight)
}
