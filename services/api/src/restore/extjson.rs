//! services/api/src/restore/extjson.rs
//!
//! Unwraps the type-tagged envelopes (`{"$numberInt": "5"}`, `{"$date": ...}`,
//! `{"$oid": ...}`) that database exports wrap around plain values.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Reads an integer from a plain number, a numeric string or a numeric envelope.
pub fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_int_prefix(s),
        Value::Object(map) => ["$numberInt", "$numberLong", "$numberDouble"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(int_value),
        _ => None,
    }
}

/// Narrows a dumped integer to `i32`, saturating at the bounds.
pub fn saturating_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Reads a timestamp from an RFC 3339 string, epoch milliseconds or a `$date` envelope.
pub fn date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok(),
        Value::Number(_) => int_value(value).and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => map.get("$date").and_then(|inner| match inner {
            Value::Object(_) => int_value(inner).and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            other => date_value(other),
        }),
        _ => None,
    }
}

/// Reads an external identifier, which may be a string, a number or an `$oid` envelope.
pub fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(id_value),
        _ => None,
    }
}

/// Reads a non-empty string.
pub fn str_value(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Parses the leading decimal digits of `raw`, ignoring surrounding whitespace.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_number_envelopes() {
        assert_eq!(int_value(&json!({"$numberInt": "5"})), Some(5));
        assert_eq!(int_value(&json!({"$numberLong": "1700000000000"})), Some(1_700_000_000_000));
        assert_eq!(int_value(&json!(12)), Some(12));
        assert_eq!(int_value(&json!("7")), Some(7));
        assert_eq!(int_value(&json!(null)), None);
    }

    #[test]
    fn narrowing_saturates_instead_of_wrapping() {
        assert_eq!(saturating_i32(42), 42);
        assert_eq!(saturating_i32(4_294_967_297), i32::MAX);
        assert_eq!(saturating_i32(-4_294_967_297), i32::MIN);
    }

    #[test]
    fn integer_prefix_matches_lenient_parsing() {
        assert_eq!(parse_int_prefix("12abc"), Some(12));
        assert_eq!(parse_int_prefix(" 3 "), Some(3));
        assert_eq!(parse_int_prefix("abc"), None);
        assert_eq!(parse_int_prefix(""), None);
    }

    #[test]
    fn unwraps_dates() {
        let expected = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(date_value(&json!("2023-11-14T22:13:20Z")), Some(expected));
        assert_eq!(date_value(&json!({"$date": "2023-11-14T22:13:20.000Z"})), Some(expected));
        assert_eq!(date_value(&json!({"$date": {"$numberLong": "1700000000000"}})), Some(expected));
        assert_eq!(date_value(&json!(1_700_000_000_000_i64)), Some(expected));
        assert_eq!(date_value(&json!("yesterday")), None);
    }

    #[test]
    fn unwraps_ids() {
        assert_eq!(id_value(&json!("u1")), Some("u1".to_string()));
        assert_eq!(id_value(&json!(17)), Some("17".to_string()));
        assert_eq!(id_value(&json!({"$oid": "65a0"})), Some("65a0".to_string()));
        assert_eq!(id_value(&json!("")), None);
    }
}
