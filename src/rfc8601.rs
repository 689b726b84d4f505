//! Duration encoding for the store's `ttl` column.
//!
//! Durations are sent to Postgres as text so that expiry is computed by
//! `now() + interval` inside the database, not client-side: that is what
//! keeps a stale client's writes landing with a correct expiry even under
//! clock skew between client and database.

use std::time::Duration;

/// Formats `duration` as a simplified RFC-8601 duration string, truncated to
/// whole seconds and upper-cased: `PT1H2M3S`, `PT1S`, `PT0S`.
pub fn format(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&format!("{seconds}S"));
    }
    out
}
