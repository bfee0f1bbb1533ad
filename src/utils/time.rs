#![forbid(unsafe_code)]

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};

/// The timestamp format persisted to and read from the database: ISO-8601
/// UTC with second precision, matching the `times are ISO-8601 UTC` wire
/// contract in the external interface spec.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---------------------------------------------------------------------------
// timestamp_utc:
// ---------------------------------------------------------------------------
pub fn timestamp_utc() -> DateTime<Utc> {
    Utc::now()
}

// ---------------------------------------------------------------------------
// timestamp_utc_to_str:
// ---------------------------------------------------------------------------
pub fn timestamp_utc_to_str(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// timestamp_str_to_datetime:
// ---------------------------------------------------------------------------
pub fn timestamp_str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Unable to parse timestamp '{}': {}", s, e))
}

// ---------------------------------------------------------------------------
// calc_expires_at:
// ---------------------------------------------------------------------------
/** Add the given number of minutes to `now` and render it in wire format.
 * A negative or overflowing minute count saturates at the chrono max.
 */
pub fn calc_expires_at(now: DateTime<Utc>, ttl_minutes: i64) -> String {
    let expires = now
        .checked_add_signed(Duration::minutes(ttl_minutes))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    timestamp_utc_to_str(expires)
}
