//! Timestamp helpers.
//!
//! All timestamps are persisted as RFC 3339 UTC strings with microsecond
//! precision so that lexical order in SQLite matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage.
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Unparseable values fall back to the epoch.
pub fn from_db(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_storage_format_sorts_lexically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        assert!(to_db(&a) < to_db(&b));
        assert_eq!(from_db(&to_db(&a)), a);
    }

    #[test]
    fn test_garbage_parses_to_epoch() {
        assert_eq!(from_db("yesterday").timestamp(), 0);
    }
}
