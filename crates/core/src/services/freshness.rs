//! How old a cached quote may be before it must be refetched.
//!
//! Market hours are judged on the serving process's local clock, not the
//! exchange's timezone, and without a holiday calendar.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc, Weekday};

/// TTL of intraday (5-minute series) snapshots.
pub const INTRADAY_TTL_MINUTES: u32 = 15;

/// TTL of daily snapshots while markets are assumed open.
pub const MARKET_OPEN_TTL_MINUTES: u32 = 60;

/// TTL of daily snapshots outside market hours.
pub const MARKET_CLOSED_TTL_MINUTES: u32 = 1440;

/// Local hour window `[open, close)` treated as market hours.
pub const MARKET_OPEN_HOUR: u32 = 8;
pub const MARKET_CLOSE_HOUR: u32 = 22;

/// Monday to Friday, between 08:00 and 22:00 local.
pub fn is_market_open(local_now: NaiveDateTime) -> bool {
    let weekday = !matches!(local_now.weekday(), Weekday::Sat | Weekday::Sun);
    let hour = local_now.hour();
    weekday && (MARKET_OPEN_HOUR..MARKET_CLOSE_HOUR).contains(&hour)
}

/// Allowed cache age in minutes for one request.
///
/// An operator override wins over everything else.
pub fn required_ttl_minutes(
    local_now: NaiveDateTime,
    is_intraday: bool,
    override_minutes: Option<u32>,
) -> u32 {
    if let Some(minutes) = override_minutes {
        return minutes;
    }
    if is_intraday {
        INTRADAY_TTL_MINUTES
    } else if is_market_open(local_now) {
        MARKET_OPEN_TTL_MINUTES
    } else {
        MARKET_CLOSED_TTL_MINUTES
    }
}

/// `now − updated_at < ttl`. An entry stamped in the future counts as fresh.
pub fn is_fresh(updated_at: DateTime<Utc>, ttl_minutes: u32, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(updated_at) < Duration::minutes(i64::from(ttl_minutes))
}
