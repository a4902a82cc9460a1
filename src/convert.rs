//! Conversion between `serde_json` documents and Mace values.

use chrono::{NaiveDate, NaiveDateTime};

use crate::value::{Map, Value};

/// Options controlling how input JSON becomes a [`Value`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Turn `YYYY-MM-DD` strings into dates and
    /// `YYYY-MM-DD[ T]HH:MM:SS[.fff]` strings into date-times.
    pub parse_datetimes: bool,
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_datetime(s: &str) -> Option<Value> {
    // cheap shape check before handing the string to chrono
    let bytes = s.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if bytes.len() == 10 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Value::Date);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(Value::DateTime)
}

/// Convert serde_json::Value to a Mace Value
pub fn json_to_value(v: serde_json::Value, options: &ConvertOptions) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => {
            if options.parse_datetimes {
                if let Some(date) = parse_datetime(&s) {
                    return date;
                }
            }
            Value::String(s)
        }
        serde_json::Value::Array(arr) => Value::Array(
            arr.into_iter()
                .map(|item| json_to_value(item, options))
                .collect(),
        ),
        serde_json::Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (k, json_to_value(v, options)))
                .collect::<Map>(),
        ),
    }
}

/// Parses JSON text straight into a Value.
pub fn parse_json(text: &str, options: &ConvertOptions) -> Result<Value, serde_json::Error> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(json_to_value(json, options))
}

/// Convert a Mace Value to serde_json::Value
///
/// Fractions and dates become strings; non-finite floats become `null`
/// because JSON has no spelling for them.
pub fn value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Integer(i) => serde_json::Value::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Rational(r) => serde_json::Value::String(r.to_string()),
        Value::String(s) => serde_json::Value::String(s),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => {
            serde_json::Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(value_to_json).collect()),
        Value::Object(obj) => serde_json::Value::Object(
            obj.into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
    }
}
