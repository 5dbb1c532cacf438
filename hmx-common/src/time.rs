//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Longest TTL representable as an expiry; larger values are capped.
const MAX_TTL_DAYS: i64 = 36_500;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Compute the instant at which something stored at `from` with `ttl` expires.
///
/// TTLs beyond ~100 years are capped rather than overflowing.
pub fn expiry_after(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(MAX_TTL_DAYS);
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(cap).min(cap);
    from.checked_add_signed(ttl).unwrap_or(from + cap)
}
