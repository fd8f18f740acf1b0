//! Human-readable renderings of version stamps.

use chrono::{DateTime, Utc};

const UNITS: [(i64, &str); 6] = [
    (365 * 24 * 3600, "year"),
    (30 * 24 * 3600, "month"),
    (24 * 3600, "day"),
    (3600, "hour"),
    (60, "minute"),
    (1, "second"),
];

/// Relative label such as `"3 hours ago"`, measured from `now`.
pub fn version_label(version: i64, now: i64) -> String {
    let elapsed = (now - version).max(0);
    for (secs, unit) in UNITS {
        let n = elapsed / secs;
        if n > 0 {
            let plural = if n == 1 { "" } else { "s" };
            return format!("{n} {unit}{plural} ago");
        }
    }
    "just now".to_string()
}

/// Absolute UTC time in `dd/mm/YYYY HH:MM:SS`.
pub fn version_time(version: i64) -> String {
    DateTime::<Utc>::from_timestamp(version, 0)
        .map(|t| t.format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Current time in Unix seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}
