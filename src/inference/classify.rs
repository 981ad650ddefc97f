//! Classification of single record values

use crate::models::{DiscoveredType, Value, ValueFormat, ValueType};

use super::formats::detect_date_format;

/// Determine the semantic type and sub-format of one value
///
/// Native values map directly. Strings are classified by content, in order: null-like,
/// the ambiguous `"0"`/`"1"`, boolean words, numbers, dates, and finally plain strings.
pub fn classify(value: &Value) -> DiscoveredType {
    match value {
        Value::Null => DiscoveredType::plain(ValueType::Null),
        Value::Boolean(_) => DiscoveredType::new(ValueType::Boolean, Some(ValueFormat::Boolean)),
        Value::Integer(_) | Value::BigInteger(_) => {
            DiscoveredType::new(ValueType::Number, Some(ValueFormat::Integer))
        }
        Value::Number(n) => DiscoveredType::new(ValueType::Number, Some(number_format(*n))),
        Value::String(s) => classify_str(s),
        Value::Date(_) => DiscoveredType::new(ValueType::Date, Some(ValueFormat::DateTime)),
        Value::Array(_) => DiscoveredType::plain(ValueType::Array),
        Value::Object(_) => DiscoveredType::plain(ValueType::Object),
    }
}

/// Classify a string by its content
pub fn classify_str(value: &str) -> DiscoveredType {
    let trimmed = value.trim();

    if trimmed.is_empty() || trimmed == "null" {
        return DiscoveredType::plain(ValueType::Null);
    }
    if trimmed == "1" || trimmed == "0" {
        return DiscoveredType::new(ValueType::Binary, Some(ValueFormat::Binary));
    }
    if parse_boolean(trimmed).is_some() {
        return DiscoveredType::new(ValueType::Boolean, Some(ValueFormat::Boolean));
    }
    if let Some(n) = parse_number(trimmed) {
        return DiscoveredType::new(ValueType::Number, Some(number_format(n)));
    }
    if let Some(format) = detect_date_format(trimmed) {
        return DiscoveredType::new(ValueType::Date, Some(format));
    }

    DiscoveredType::plain(ValueType::String)
}

fn number_format(n: f64) -> ValueFormat {
    if n.is_finite() && n.fract() == 0.0 {
        ValueFormat::Integer
    } else {
        ValueFormat::Number
    }
}

/// Boolean words, case-insensitive
pub fn parse_boolean(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        None
    }
}

/// Parse a decimal number
///
/// Leading zeros that are not followed by a decimal point disqualify the string
/// (`"007"` is an identifier, not a number). `inf`/`nan` spellings are not numbers.
pub fn parse_number(value: &str) -> Option<f64> {
    let unsigned = value.strip_prefix(['-', '+']).unwrap_or(value);
    if unsigned.is_empty() {
        return None;
    }
    if !unsigned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
    {
        return None;
    }
    if !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if unsigned.len() > 1 && unsigned.starts_with('0') && !unsigned[1..].starts_with('.') {
        return None;
    }

    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn type_of(s: &str) -> ValueType {
        classify_str(s).value_type
    }

    #[test]
    fn test_null_like_strings() {
        assert_eq!(type_of(""), ValueType::Null);
        assert_eq!(type_of("   "), ValueType::Null);
        assert_eq!(type_of("null"), ValueType::Null);
        assert_eq!(classify(&Value::Null).value_type, ValueType::Null);
    }

    #[test]
    fn test_binary_is_not_resolved() {
        let one = classify_str("1");
        assert_eq!(one.value_type, ValueType::Binary);
        assert_eq!(one.format, Some(ValueFormat::Binary));
        assert_eq!(type_of("0"), ValueType::Binary);
        assert_eq!(type_of("2"), ValueType::Number);
    }

    #[test]
    fn test_booleans() {
        for s in ["true", "FALSE", "Yes", "no"] {
            assert_eq!(type_of(s), ValueType::Boolean, "{s}");
        }
        assert_eq!(classify(&Value::Boolean(true)).value_type, ValueType::Boolean);
    }

    #[test]
    fn test_numbers() {
        let int = classify_str("42");
        assert_eq!(int.value_type, ValueType::Number);
        assert_eq!(int.format, Some(ValueFormat::Integer));

        assert_eq!(classify_str("4.0").format, Some(ValueFormat::Integer));
        assert_eq!(classify_str("-3.25").format, Some(ValueFormat::Number));
        assert_eq!(classify_str("0.5").format, Some(ValueFormat::Number));
        assert_eq!(classify_str("1e3").format, Some(ValueFormat::Integer));

        assert_eq!(
            classify(&Value::BigInteger(i128::MAX)).format,
            Some(ValueFormat::Integer)
        );
        assert_eq!(classify(&Value::Number(1.5)).format, Some(ValueFormat::Number));
    }

    #[test]
    fn test_leading_zero_stays_string() {
        assert_eq!(type_of("007"), ValueType::String);
        assert_eq!(type_of("-007"), ValueType::String);
        assert_eq!(type_of("00.5"), ValueType::String);
    }

    #[test]
    fn test_special_float_spellings_are_strings() {
        assert_eq!(type_of("inf"), ValueType::String);
        assert_eq!(type_of("NaN"), ValueType::String);
        assert_eq!(type_of("infinity"), ValueType::String);
        assert_eq!(type_of("-"), ValueType::String);
        assert_eq!(type_of("1-2"), ValueType::String);
    }

    #[test]
    fn test_dates() {
        let date = classify_str("2024-01-15");
        assert_eq!(date.value_type, ValueType::Date);
        assert_eq!(date.format, Some(ValueFormat::Date));

        let dt = classify_str("2024-01-15T10:30:00Z");
        assert_eq!(dt.format, Some(ValueFormat::DateTime));

        let native = classify(&Value::Date(Utc::now()));
        assert_eq!(native.value_type, ValueType::Date);
        assert_eq!(native.format, Some(ValueFormat::DateTime));
    }

    #[test]
    fn test_structured_values() {
        assert_eq!(classify(&Value::Array(vec![])).value_type, ValueType::Array);
        assert_eq!(
            classify(&Value::Object(Default::default())).value_type,
            ValueType::Object
        );
        assert_eq!(type_of("hello"), ValueType::String);
    }
}
