//! Wall-clock timestamps for persisted records.

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC 3339 with second precision (`2026-01-02T03:04:05Z`).
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
