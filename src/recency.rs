//! Recency filtering of posting timestamps.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Whether `timestamp` falls inside `window` before `now`.
///
/// Absent or unparseable timestamps are excluded. A window reaching past
/// the earliest representable instant admits every parsed timestamp.
pub fn is_recent(timestamp: Option<&str>, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(posted) = timestamp.and_then(parse_timestamp) else {
        return false;
    };
    match now.checked_sub_signed(window) {
        Some(cutoff) => posted >= cutoff,
        None => true,
    }
}

/// Parse an ISO-8601 timestamp. Accepts full RFC 3339, a naive
/// date-time (treated as UTC), or a bare date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.trim_end_matches('Z');
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_date_included() {
        assert!(is_recent(Some("2025-03-08"), now(), Duration::days(7)));
        assert!(is_recent(
            Some("2025-03-09T08:30:00Z"),
            now(),
            Duration::days(7)
        ));
    }

    #[test]
    fn test_old_date_excluded() {
        assert!(!is_recent(Some("2025-02-01"), now(), Duration::days(7)));
    }

    #[test]
    fn test_window_boundary_inclusive() {
        assert!(is_recent(
            Some("2025-03-03T12:00:00"),
            now(),
            Duration::days(7)
        ));
        assert!(!is_recent(
            Some("2025-03-03T11:59:59"),
            now(),
            Duration::days(7)
        ));
    }

    #[test]
    fn test_absent_or_garbage_excluded() {
        assert!(!is_recent(None, now(), Duration::days(7)));
        assert!(!is_recent(Some(""), now(), Duration::days(7)));
        assert!(!is_recent(Some("2 days ago"), now(), Duration::days(7)));
    }

    #[test]
    fn test_window_is_injectable() {
        assert!(!is_recent(Some("2025-03-08"), now(), Duration::days(1)));
        assert!(is_recent(Some("2025-03-08"), now(), Duration::days(30)));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let window = Duration::try_days(1_000_000_000).unwrap();
        assert!(is_recent(Some("1970-01-01"), now(), window));
        assert!(!is_recent(Some("garbage"), now(), window));
    }

    #[test]
    fn test_parse_offset_timestamp() {
        let parsed = parse_timestamp("2025-03-09T10:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 9, 8, 0, 0).unwrap());
    }
}
