/// Time utility functions for mcpwire
///
/// Wire timestamps come in two shapes: RFC 3339 strings (what the client
/// stamps on every message) and epoch milliseconds (what the action log
/// stores). Everything that produces a timestamp goes through this module so
/// both shapes stay consistent.
use chrono::{DateTime, SecondsFormat, Utc};

/// Generate current UTC timestamp in RFC 3339 format with millisecond precision.
///
/// # Format
/// RFC 3339: "2024-01-01T00:00:00.000Z"
///
/// # Example
/// ```
/// let timestamp = mcpwire_lib::utils::now_utc();
/// assert!(timestamp.ends_with('Z'));
/// ```
pub fn now_utc() -> String {
    format_utc(Utc::now())
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format DateTime<Utc> to an RFC 3339 string with millisecond precision.
pub fn format_utc(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse RFC 3339 timestamp and convert to UTC DateTime.
pub fn parse_to_utc(timestamp: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{}': {}", timestamp, e))
}

/// Convert epoch milliseconds to UTC DateTime.
///
/// Negative values and values past chrono's range are rejected.
pub fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>, String> {
    if millis < 0 {
        return Err(format!("Invalid timestamp '{}': negative epoch", millis));
    }
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| format!("Invalid timestamp '{}': out of range", millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_now_utc() {
        let timestamp = now_utc();
        assert!(timestamp.ends_with('Z'), "UTC timestamp should end with Z");
        assert!(parse_to_utc(&timestamp).is_ok());
        // millisecond precision: "YYYY-MM-DDTHH:MM:SS.mmmZ"
        assert_eq!(timestamp.len(), 24);
    }

    #[test]
    fn test_parse_to_utc() {
        let dt = parse_to_utc("2024-01-01T00:00:00.000Z").unwrap();
        assert_eq!(dt.hour(), 0);

        // 10:30 +08:00 = 02:30 UTC
        let dt = parse_to_utc("2025-12-17T10:30:00+08:00").unwrap();
        assert_eq!(dt.hour(), 2);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        let result = parse_to_utc("yesterday");
        assert!(result.unwrap_err().contains("Invalid timestamp"));
    }

    #[test]
    fn test_millis_to_utc() {
        let dt = millis_to_utc(1_704_067_200_000).unwrap();
        assert_eq!(format_utc(dt), "2024-01-01T00:00:00.000Z");

        assert!(millis_to_utc(-1).is_err());
        assert!(millis_to_utc(i64::MAX).is_err());
    }
}
