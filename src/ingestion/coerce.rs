//! Best-effort conversion of raw cells into typed [`Value`]s.
//!
//! Coercion never fails the import: every cell yields a [`Coerced`] outcome, and the caller
//! substitutes the field default for [`Coerced::Missing`] and [`Coerced::Unparsable`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::{FieldType, RawValue, Value};

/// Cell contents treated as "no value", compared case-insensitively after trimming.
pub const MISSING_TOKENS: &[&str] = &["", "nan", "none", "null", "na", "n/a"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

// Month-first before day-first for slash dates; day-first only wins when month-first is invalid.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Result of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// The cell held a usable value.
    Value(Value),
    /// The cell was absent, empty or a missing-value token.
    Missing,
    /// The cell had content that could not be read as the target type.
    Unparsable,
}

impl Coerced {
    /// The coerced value, or `default` when there is none.
    pub fn or_default(self, default: Value) -> Value {
        match self {
            Self::Value(v) => v,
            Self::Missing | Self::Unparsable => default,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

/// Returns `true` for cells that carry no value.
pub fn is_missing_token(s: &str) -> bool {
    let t = s.trim();
    MISSING_TOKENS.iter().any(|tok| t.eq_ignore_ascii_case(tok))
}

/// Coerce `raw` to `field_type`.
pub fn coerce(raw: &RawValue, field_type: FieldType) -> Coerced {
    match field_type {
        FieldType::Text => coerce_text(raw),
        FieldType::Decimal => coerce_decimal(raw),
        FieldType::Timestamp => coerce_timestamp(raw),
    }
}

/// Coerce `raw` to `field_type`, falling back to `default`.
pub fn coerce_or_default(raw: &RawValue, field_type: FieldType, default: Value) -> Value {
    coerce(raw, field_type).or_default(default)
}

fn coerce_text(raw: &RawValue) -> Coerced {
    match raw {
        RawValue::Missing => Coerced::Missing,
        RawValue::Number(v) if v.is_finite() => Coerced::Value(Value::Text(v.to_string())),
        RawValue::Number(_) => Coerced::Missing,
        RawValue::Text(s) if is_missing_token(s) => Coerced::Missing,
        RawValue::Text(s) => Coerced::Value(Value::Text(s.trim().to_owned())),
    }
}

fn coerce_decimal(raw: &RawValue) -> Coerced {
    match raw {
        RawValue::Missing => Coerced::Missing,
        RawValue::Number(v) if v.is_finite() => Coerced::Value(Value::Decimal(*v)),
        RawValue::Number(_) => Coerced::Missing,
        RawValue::Text(s) if is_missing_token(s) => Coerced::Missing,
        RawValue::Text(s) => match parse_decimal(s) {
            Some(v) => Coerced::Value(Value::Decimal(v)),
            None => Coerced::Unparsable,
        },
    }
}

fn coerce_timestamp(raw: &RawValue) -> Coerced {
    match raw {
        RawValue::Missing => Coerced::Missing,
        RawValue::Number(_) => Coerced::Unparsable,
        RawValue::Text(s) if is_missing_token(s) => Coerced::Missing,
        RawValue::Text(s) => match parse_timestamp(s) {
            Some(ts) => Coerced::Value(Value::Timestamp(ts)),
            None => Coerced::Unparsable,
        },
    }
}

/// Parse a loosely formatted number such as `"$1,234.50"`, `"12%"` or `"-€3"`.
///
/// Plain numeric literals parse directly. Otherwise only digits, one decimal point and a minus
/// sign before the first digit are kept; anything else is dropped. A second decimal point, a
/// minus after the first digit, or no digits at all make the cell unparsable.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return v.is_finite().then_some(v);
    }

    let mut cleaned = String::with_capacity(trimmed.len());
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                cleaned.push(c);
            }
            '.' if seen_point => return None,
            '.' => {
                seen_point = true;
                cleaned.push(c);
            }
            '-' if seen_digit || cleaned.starts_with('-') => return None,
            '-' => cleaned.insert(0, '-'),
            _ => {}
        }
    }

    if !seen_digit {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Permissive date/time parse: RFC 3339 / RFC 2822, common ISO, slash, dash and dotted layouts
/// (with or without a time), and English month names. Offsets are converted to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            coerce(&RawValue::from("  Acme  "), FieldType::Text),
            Coerced::Value(Value::Text("Acme".to_string()))
        );
    }

    #[test]
    fn text_sentinels_are_missing() {
        for raw in ["", "   ", "nan", "NaN", "None", "NULL", "null", "N/A", "na"] {
            assert_eq!(coerce(&RawValue::from(raw), FieldType::Text), Coerced::Missing, "{raw:?}");
        }
        assert_eq!(coerce(&RawValue::Missing, FieldType::Text), Coerced::Missing);
    }

    #[test]
    fn text_from_number() {
        assert_eq!(
            coerce(&RawValue::Number(12.0), FieldType::Text),
            Coerced::Value(Value::Text("12".to_string()))
        );
    }

    #[test]
    fn decimal_strips_currency_and_thousands() {
        assert_eq!(parse_decimal("$1,234.50"), Some(1234.50));
        assert_eq!(parse_decimal("1,250.00"), Some(1250.0));
        assert_eq!(parse_decimal("12.5%"), Some(12.5));
        assert_eq!(parse_decimal("-$5"), Some(-5.0));
        assert_eq!(parse_decimal("$-5"), Some(-5.0));
        assert_eq!(parse_decimal("USD 3"), Some(3.0));
        assert_eq!(parse_decimal("1e3"), Some(1000.0));
    }

    #[test]
    fn decimal_rejects_ambiguous_input() {
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal("12-3"), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("$"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn decimal_defaults_for_missing_or_bad_cells() {
        let default = Value::Decimal(0.0);
        for raw in ["", "N/A", "null", "abc"] {
            assert_eq!(
                coerce_or_default(&RawValue::from(raw), FieldType::Decimal, default.clone()),
                default,
                "{raw:?}"
            );
        }
        assert_eq!(
            coerce(&RawValue::from("abc"), FieldType::Decimal),
            Coerced::Unparsable
        );
        assert_eq!(
            coerce_or_default(&RawValue::from("$1,234.50"), FieldType::Decimal, default),
            Value::Decimal(1234.50)
        );
    }

    #[test]
    fn decimal_passes_numbers_through() {
        assert_eq!(
            coerce(&RawValue::Number(7.25), FieldType::Decimal),
            Coerced::Value(Value::Decimal(7.25))
        );
        assert_eq!(coerce(&RawValue::Number(f64::NAN), FieldType::Decimal), Coerced::Missing);
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-05"), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
        assert_eq!(
            parse_timestamp("2024-01-05 13:45:10"),
            Some(ymd_hms(2024, 1, 5, 13, 45, 10))
        );
        assert_eq!(
            parse_timestamp("2024-01-05T13:45:00Z"),
            Some(ymd_hms(2024, 1, 5, 13, 45, 0))
        );
        assert_eq!(
            parse_timestamp("2024-01-05T13:45:00+02:00"),
            Some(ymd_hms(2024, 1, 5, 11, 45, 0))
        );
        assert_eq!(parse_timestamp("2024/01/05"), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
        assert_eq!(parse_timestamp("Jan 05, 2024"), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
    }

    #[test]
    fn slash_dates_are_month_first_unless_impossible() {
        assert_eq!(parse_timestamp("01/05/2024"), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
        assert_eq!(parse_timestamp("25/12/2024"), Some(ymd_hms(2024, 12, 25, 0, 0, 0)));
    }

    #[test]
    fn timestamp_defaults_for_missing_or_bad_cells() {
        let default = Value::Timestamp(ymd_hms(2000, 1, 1, 0, 0, 0));
        assert_eq!(coerce(&RawValue::from(""), FieldType::Timestamp), Coerced::Missing);
        assert_eq!(
            coerce(&RawValue::from("not a date"), FieldType::Timestamp),
            Coerced::Unparsable
        );
        assert_eq!(
            coerce_or_default(&RawValue::from("31/31/2024"), FieldType::Timestamp, default.clone()),
            default
        );
        assert_eq!(
            coerce(&RawValue::Number(20240105.0), FieldType::Timestamp),
            Coerced::Unparsable
        );
    }
}
