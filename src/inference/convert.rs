//! Conversion of raw values into canonical in-memory representations

use chrono::{DateTime, NaiveTime, Utc};

use crate::models::{DiscoveredType, Value, ValueFormat, ValueKind, ValueType};

use super::classify::{parse_boolean, parse_number};
use super::error::InferenceError;
use super::formats::parse_date;

/// Convert a value into the canonical representation for its discovered type
///
/// Binary values become booleans; numeric strings become integers or numbers; date
/// strings become UTC instants. Strings, arrays and objects are kept as they are.
pub fn to_canonical(value: &Value, discovered: DiscoveredType) -> Result<Value, InferenceError> {
    let target = discovered.value_type;
    match (target, value) {
        (ValueType::Null, _) => Ok(Value::Null),

        (ValueType::Binary, Value::String(s)) => match s.trim() {
            "1" => Ok(Value::Boolean(true)),
            "0" => Ok(Value::Boolean(false)),
            _ => Err(InferenceError::unsupported(value, target)),
        },

        (ValueType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(*b)),
        (ValueType::Boolean, Value::String(s)) => parse_boolean(s.trim())
            .map(Value::Boolean)
            .ok_or_else(|| InferenceError::unsupported(value, target)),

        (ValueType::Number, Value::Integer(_) | Value::BigInteger(_) | Value::Number(_)) => {
            Ok(value.clone())
        }
        (ValueType::Number, Value::String(s)) => {
            let integer = discovered.format == Some(ValueFormat::Integer);
            parse_numeric(s.trim(), integer)
                .ok_or_else(|| InferenceError::unsupported(value, target))
        }

        (ValueType::Date, Value::Date(d)) => Ok(Value::Date(*d)),
        (ValueType::Date, Value::String(s)) => parse_date(s)
            .map(|(d, _)| Value::Date(d))
            .ok_or_else(|| InferenceError::unsupported(value, target)),

        (ValueType::String | ValueType::Array | ValueType::Object, _) => Ok(value.clone()),

        _ => Err(InferenceError::unsupported(value, target)),
    }
}

/// Parse a numeric string, preferring an exact integer representation
fn parse_numeric(s: &str, integer: bool) -> Option<Value> {
    if integer {
        if let Ok(n) = s.parse::<i64>() {
            return Some(Value::Integer(n));
        }
        if let Ok(n) = s.parse::<i128>() {
            return Some(Value::BigInteger(n));
        }
    }
    let n = parse_number(s)?;
    if integer && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::Integer(n as i64));
    }
    Some(Value::Number(n))
}

/// Cast a value to a replay kind
///
/// Nulls pass through. Anything renders as a string. Booleans become `0`/`1`, and any
/// non-zero number becomes `true`. Dates and date-times convert into each other.
pub fn cast_to_kind(value: &Value, kind: ValueKind) -> Result<Value, InferenceError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let fail = || InferenceError::unsupported(value, kind);

    match kind {
        ValueKind::String => Ok(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),

        ValueKind::Boolean => match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::String(s) => {
                let s = s.trim();
                parse_boolean(s)
                    .or_else(|| parse_number(s).map(|n| n != 0.0))
                    .map(Value::Boolean)
                    .ok_or_else(fail)
            }
            other => other.as_f64().map(|n| Value::Boolean(n != 0.0)).ok_or_else(fail),
        },

        ValueKind::Integer => match value {
            Value::Integer(_) | Value::BigInteger(_) => Ok(value.clone()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Ok(Value::Integer(*n as i64))
            }
            Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
            Value::String(s) => {
                let s = s.trim();
                if let Some(b) = parse_boolean(s) {
                    return Ok(Value::Integer(i64::from(b)));
                }
                match parse_numeric(s, true) {
                    Some(v @ (Value::Integer(_) | Value::BigInteger(_))) => Ok(v),
                    _ => Err(fail()),
                }
            }
            _ => Err(fail()),
        },

        ValueKind::Number => match value {
            Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => {
                let s = s.trim();
                if let Some(b) = parse_boolean(s) {
                    return Ok(Value::Number(if b { 1.0 } else { 0.0 }));
                }
                parse_number(s).map(Value::Number).ok_or_else(fail)
            }
            other => other.as_f64().map(Value::Number).ok_or_else(fail),
        },

        ValueKind::Date => to_instant(value)
            .map(|d| Value::Date(start_of_day(d)))
            .ok_or_else(fail),

        ValueKind::DateTime => to_instant(value).map(Value::Date).ok_or_else(fail),
    }
}

fn to_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::String(s) => parse_date(s).map(|(d, _)| d),
        _ => None,
    }
}

fn start_of_day(d: DateTime<Utc>) -> DateTime<Utc> {
    d.date_naive().and_time(NaiveTime::MIN).and_utc()
}
