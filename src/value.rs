use std::{cmp::Ordering, fmt};

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::rational::Rational;

/// Ordered string-keyed map used for objects. Insertion order is kept.
pub type Map = IndexMap<String, Value>;

/// A JSON value used throughout the Mace query language.
///
/// Beyond the JSON types this distinguishes integers from floats, carries
/// exact fractions produced by integer division, and holds calendar dates
/// and date-times when the input converter was asked to recognize them.
///
/// # Numeric tower
///
/// `Boolean`, `Integer`, `Rational` and `Float` compare by mathematical
/// value, so `true == 1.0` and `false == 0` hold. Every other kind compares
/// structurally. Object equality ignores key order.
///
/// # Examples
///
/// ```
/// use mace_lang::value::{Map, Value};
///
/// let array = Value::Array(vec![Value::Integer(1), Value::Float(2.5)]);
///
/// let mut obj = Map::new();
/// obj.insert("key".to_string(), Value::String("value".to_string()));
/// let object = Value::Object(obj);
///
/// assert_eq!(Value::Boolean(true), Value::Float(1.0));
/// assert_ne!(array, object);
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// JSON null
    Null,

    /// JSON boolean; also `0`/`1` in arithmetic
    Boolean(bool),

    /// 64-bit integer
    Integer(i64),

    /// Floating-point number, including `NaN` and `±Infinity`
    Float(f64),

    /// Exact non-integral fraction
    Rational(Rational),

    /// UTF-8 string
    String(String),

    /// Calendar date (`2024-02-29`)
    Date(NaiveDate),

    /// Date and time of day without a zone (`2024-02-29 13:45:00`)
    DateTime(NaiveDateTime),

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// Ordered mapping with unique string keys
    Object(Map),
}

/// A number pulled out of the tower for arithmetic.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Exact(i128, i128),
    Float(f64),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Rational(_) => "rational",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Truthiness for `not`, `ifelse` and friends.
    ///
    /// Empty strings and collections, zero, `NaN`, `false` and `null` are
    /// falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0 && !n.is_nan(),
            Value::Rational(_) => true,
            Value::String(s) => !s.is_empty(),
            Value::Date(_) | Value::DateTime(_) => true,
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_container()
    }

    /// True for booleans, integers, rationals and floats.
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::Rational(_)
        )
    }

    /// True for an empty array or object.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::Array(arr) => arr.is_empty(),
            Value::Object(obj) => obj.is_empty(),
            _ => false,
        }
    }

    /// Get as float, widening every member of the numeric tower
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Rational(r) => Some(r.to_f64()),
            _ => None,
        }
    }

    /// Get as integer; booleans count as `0`/`1`, floats and fractions do not
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Boolean(b) => Some(*b as i64),
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Boolean(b) => Some(Number::Exact(*b as i128, 1)),
            Value::Integer(n) => Some(Number::Exact(*n as i128, 1)),
            Value::Rational(r) => {
                let (n, d) = r.parts();
                Some(Number::Exact(n, d))
            }
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Orders two values of comparable kinds.
    ///
    /// Numbers compare across the tower (exactly when neither side is a
    /// float), strings compare by code point, and dates compare with
    /// date-times by treating a date as midnight. Any other pairing, or a
    /// comparison involving `NaN`, yields `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::DateTime(b)) => a.and_hms_opt(0, 0, 0).map(|a| a.cmp(b)),
            (Value::DateTime(a), Value::Date(b)) => b.and_hms_opt(0, 0, 0).map(|b| a.cmp(&b)),
            _ => match (self.as_number()?, other.as_number()?) {
                (Number::Exact(a, b), Number::Exact(c, d)) => Some((a * d).cmp(&(c * b))),
                _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (String(a), String(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ if self.is_number() && other.is_number() => {
                self.compare(other) == Some(Ordering::Equal)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Strings display bare; everything else displays as compact JSON text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Rational(r) => write!(f, "{}", r),
            _ => f.write_str(&crate::output::to_json(self)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tower_equality() {
        assert_eq!(Value::Boolean(true), Value::Float(1.0));
        assert_eq!(Value::Boolean(false), Value::Integer(0));
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_eq!(
            Value::Rational(Rational::new(1, 2).unwrap()),
            Value::Float(0.5)
        );
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Integer(1), Value::String("1".into()));
        assert_ne!(Value::Null, Value::Boolean(false));
    }

    #[test]
    fn test_bool_int_ordering() {
        let two = Value::Integer(2);
        let t = Value::Boolean(true);
        assert_eq!(two.compare(&t), Some(Ordering::Greater));
        assert_eq!(t.compare(&Value::Float(0.5)), Some(Ordering::Greater));
        assert_eq!(Value::String("a".into()).compare(&two), None);
    }

    #[test]
    fn test_exact_comparison_avoids_float_rounding() {
        let big = Value::Integer(i64::MAX);
        let smaller = Value::Integer(i64::MAX - 1);
        assert_eq!(big.compare(&smaller), Some(Ordering::Greater));
    }

    #[test]
    fn test_object_equality_ignores_order() {
        let mut a = Map::new();
        a.insert("x".into(), Value::Integer(1));
        a.insert("y".into(), Value::Integer(2));
        let mut b = Map::new();
        b.insert("y".into(), Value::Integer(2));
        b.insert("x".into(), Value::Integer(1));
        assert_eq!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::Integer(-3).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::Object(Map::from([("a".to_string(), Value::Null)])).is_truthy());
    }

    #[test]
    fn test_dates_compare_with_datetimes() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        let dt = Value::DateTime(
            NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap(),
        );
        assert_eq!(d.compare(&dt), Some(Ordering::Greater));
    }
}
