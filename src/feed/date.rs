use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats tried after RFC 3339 and RFC 2822, assumed UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
];

/// Parses a feed date into a unix timestamp.
///
/// Accepts RFC 3339 / ISO 8601 (Atom, `dc:date`, `<time datetime>`,
/// schema.org), RFC 2822 (RSS `pubDate`) and a few zone-less variants that
/// appear in the wild. Unparseable dates yield `None`; the item keeps no time.
pub fn parse_date(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_1_2024: i64 = 1_704_067_200;

    #[test]
    fn test_rfc3339() {
        assert_eq!(parse_date("2024-01-01T00:00:00Z"), Some(JAN_1_2024));
        assert_eq!(parse_date("2024-01-01T02:00:00+02:00"), Some(JAN_1_2024));
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(parse_date("Mon, 01 Jan 2024 00:00:00 GMT"), Some(JAN_1_2024));
        assert_eq!(parse_date("Mon, 01 Jan 2024 00:00:00 +0000"), Some(JAN_1_2024));
    }

    #[test]
    fn test_naive_variants() {
        assert_eq!(parse_date("2024-01-01T00:00:00"), Some(JAN_1_2024));
        assert_eq!(parse_date("2024-01-01 00:00:00"), Some(JAN_1_2024));
        assert_eq!(parse_date(" 2024-01-01 "), Some(JAN_1_2024));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
    }
}
