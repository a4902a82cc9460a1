//! Operator kernels and the broadcasting rules that lift them over
//! arrays and objects.

use std::cmp::Ordering;

use crate::{
    ast::{BinOp, UnaryOp},
    evaluator::EvalError,
    rational::Rational,
    value::{Map, Number, Value},
};

/// Applies `f` across two operands the way every binary operator does.
///
/// - two arrays of the same length combine element by element;
/// - two objects with the same keys combine key by key, in the left
///   operand's order;
/// - a container and a scalar combine every element with the scalar;
/// - two scalars go straight to `f`.
///
/// Anything else (length or key mismatch, an array against an object)
/// is a type error.
pub fn broadcast<F>(op: &str, left: &Value, right: &Value, f: &F) -> Result<Value, EvalError>
where
    F: Fn(&Value, &Value) -> Result<Value, EvalError>,
{
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(EvalError::TypeError(format!(
                    "'{}' needs arrays of equal length, got {} and {}",
                    op,
                    a.len(),
                    b.len()
                )));
            }
            a.iter()
                .zip(b)
                .map(|(x, y)| broadcast(op, x, y, f))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        (Value::Object(a), Value::Object(b)) => {
            if a.len() != b.len() {
                return Err(key_mismatch(op));
            }
            let mut out = Map::with_capacity(a.len());
            for (k, x) in a {
                let y = b.get(k).ok_or_else(|| key_mismatch(op))?;
                out.insert(k.clone(), broadcast(op, x, y, f)?);
            }
            Ok(Value::Object(out))
        }
        (Value::Array(_), Value::Object(_)) | (Value::Object(_), Value::Array(_)) => Err(
            EvalError::TypeError(format!("'{}' cannot combine an array with an object", op)),
        ),
        (Value::Array(a), scalar) => a
            .iter()
            .map(|x| broadcast(op, x, scalar, f))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (scalar, Value::Array(b)) => b
            .iter()
            .map(|y| broadcast(op, scalar, y, f))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Value::Object(a), scalar) => a
            .iter()
            .map(|(k, x)| Ok((k.clone(), broadcast(op, x, scalar, f)?)))
            .collect::<Result<Map, _>>()
            .map(Value::Object),
        (scalar, Value::Object(b)) => b
            .iter()
            .map(|(k, y)| Ok((k.clone(), broadcast(op, scalar, y, f)?)))
            .collect::<Result<Map, _>>()
            .map(Value::Object),
        (a, b) => f(a, b),
    }
}

fn key_mismatch(op: &str) -> EvalError {
    EvalError::TypeError(format!("'{}' needs objects with the same keys", op))
}

/// Applies `f` to every scalar inside `value`, keeping its shape.
pub fn map_scalars<F>(value: &Value, f: &F) -> Result<Value, EvalError>
where
    F: Fn(&Value) -> Result<Value, EvalError>,
{
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| map_scalars(v, f))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| Ok((k.clone(), map_scalars(v, f)?)))
            .collect::<Result<Map, _>>()
            .map(Value::Object),
        scalar => f(scalar),
    }
}

/// Evaluates `left op right` with broadcasting.
///
/// # Examples
///
/// ```
/// use mace_lang::{ast::BinOp, ops::binary, Value};
///
/// let arr = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
/// let doubled = binary(BinOp::Multiply, &arr, &Value::Integer(2)).unwrap();
/// assert_eq!(doubled, Value::Array(vec![Value::Integer(2), Value::Integer(4)]));
///
/// let third = binary(BinOp::Divide, &Value::Integer(1), &Value::Integer(3)).unwrap();
/// assert_eq!(third.to_string(), "1/3");
/// ```
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    broadcast(op.symbol(), left, right, &|a, b| scalar_binary(op, a, b))
}

/// Evaluates a prefix operator on every scalar of `operand`.
pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    map_scalars(operand, &|v| scalar_unary(op, v))
}

fn mismatch(op: BinOp, a: &Value, b: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "'{}' is not defined for {} and {}",
        op,
        a.type_name(),
        b.type_name()
    ))
}

fn overflow(op: BinOp) -> EvalError {
    EvalError::Arithmetic(format!("integer overflow in '{}'", op))
}

fn exact(num: i128, den: i128) -> Result<Value, EvalError> {
    Rational::collapse(num, den)
}

fn to_f64(n: Number) -> f64 {
    match n {
        Number::Exact(num, den) => num as f64 / den as f64,
        Number::Float(f) => f,
    }
}

/// Combines two scalars; containers never reach here.
pub fn scalar_binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Equal => return Ok(Value::Boolean(a == b)),
        BinOp::NotEqual => return Ok(Value::Boolean(a != b)),
        BinOp::LessThan | BinOp::GreaterThan | BinOp::LessEqual | BinOp::GreaterEqual => {
            return compare(op, a, b);
        }
        BinOp::Matches => return regex_search(a, b),
        BinOp::And | BinOp::Or | BinOp::Xor => return logical(op, a, b),
        _ => {}
    }

    match (op, a, b) {
        (BinOp::Add, Value::String(x), Value::String(y)) => {
            return Ok(Value::String(format!("{}{}", x, y)));
        }
        (BinOp::Multiply, Value::String(s), Value::Integer(n))
        | (BinOp::Multiply, Value::Integer(n), Value::String(s)) => {
            return repeat(s, *n).map(Value::String).ok_or_else(|| {
                EvalError::Arithmetic(format!(
                    "repeating a {}-byte string {} times is too long",
                    s.len(),
                    n
                ))
            });
        }
        _ => {}
    }

    let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
        return Err(mismatch(op, a, b));
    };
    arithmetic(op, x, y)
}

/// Longest string a repetition may build.
pub(crate) const MAX_REPEAT_BYTES: usize = 1 << 28;

/// `s` repeated `n` times, or `None` past [`MAX_REPEAT_BYTES`]. A negative
/// count gives the empty string.
pub(crate) fn repeat(s: &str, n: i64) -> Option<String> {
    let count = usize::try_from(n.max(0)).ok()?;
    match s.len().checked_mul(count) {
        Some(bytes) if bytes <= MAX_REPEAT_BYTES => Some(s.repeat(count)),
        _ => None,
    }
}

fn arithmetic(op: BinOp, x: Number, y: Number) -> Result<Value, EvalError> {
    use Number::Exact;

    match (op, x, y) {
        (BinOp::Add, Exact(a, b), Exact(c, d)) => {
            let num = (a * d).checked_add(c * b).ok_or_else(|| overflow(op))?;
            exact(num, b * d)
        }
        (BinOp::Subtract, Exact(a, b), Exact(c, d)) => {
            let num = (a * d).checked_sub(c * b).ok_or_else(|| overflow(op))?;
            exact(num, b * d)
        }
        (BinOp::Multiply, Exact(a, b), Exact(c, d)) => {
            let num = a.checked_mul(c).ok_or_else(|| overflow(op))?;
            exact(num, b * d)
        }
        (BinOp::Divide, Exact(a, b), Exact(c, d)) => exact(a * d, b * c),
        (BinOp::FloorDivide, Exact(a, b), Exact(c, d)) => {
            let (num, den) = (a * d, b * c);
            if den == 0 {
                return Err(EvalError::Arithmetic("integer division by zero".into()));
            }
            // div_euclid floors only for a positive divisor
            let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
            i64::try_from(num.div_euclid(den)).map(Value::Integer).map_err(|_| overflow(op))
        }
        (BinOp::Modulo, Exact(a, 1), Exact(c, 1)) => {
            if c == 0 {
                return Err(EvalError::Arithmetic("integer modulo by zero".into()));
            }
            i64::try_from(a % c).map(Value::Integer).map_err(|_| overflow(op))
        }
        (BinOp::Power, Exact(a, b), Exact(e, 1)) => Ok(exact_power(a, b, e)
            .unwrap_or_else(|| Value::Float(to_f64(Exact(a, b)).powf(e as f64)))),
        (BinOp::FloorDivide, _, _) => Ok(Value::Float((to_f64(x) / to_f64(y)).floor())),
        _ => {
            let (a, b) = (to_f64(x), to_f64(y));
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Subtract => a - b,
                BinOp::Multiply => a * b,
                BinOp::Divide => a / b,
                BinOp::Modulo => a % b,
                BinOp::Power => a.powf(b),
                _ => return Err(EvalError::TypeError(format!("'{}' is not arithmetic", op))),
            };
            Ok(Value::Float(result))
        }
    }
}

/// `(a/b) ** e` computed exactly, or `None` when an intermediate overflows.
fn exact_power(a: i128, b: i128, e: i128) -> Option<Value> {
    let magnitude = u32::try_from(e.unsigned_abs()).ok()?;
    let num = a.checked_pow(magnitude)?;
    let den = b.checked_pow(magnitude)?;
    let (num, den) = if e < 0 { (den, num) } else { (num, den) };
    Rational::collapse(num, den).ok()
}

fn compare(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    let ordering = match a.compare(b) {
        Some(o) => o,
        // NaN orders against nothing but is still a number
        None if a.is_number() && b.is_number() => return Ok(Value::Boolean(false)),
        None => return Err(mismatch(op, a, b)),
    };
    let result = match op {
        BinOp::LessThan => ordering == Ordering::Less,
        BinOp::GreaterThan => ordering == Ordering::Greater,
        BinOp::LessEqual => ordering != Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Boolean(result))
}

fn logical(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Ok(Value::Boolean(match op {
            BinOp::And => *x && *y,
            BinOp::Or => *x || *y,
            _ => *x ^ *y,
        })),
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(match op {
            BinOp::And => x & y,
            BinOp::Or => x | y,
            _ => x ^ y,
        })),
        _ => Err(mismatch(op, a, b)),
    }
}

fn regex_search(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::String(s), Value::String(pattern)) => {
            let re = regex::Regex::new(pattern)
                .map_err(|e| EvalError::InvalidRegex(e.to_string()))?;
            Ok(Value::Boolean(re.is_match(s)))
        }
        _ => Err(mismatch(BinOp::Matches, a, b)),
    }
}

fn scalar_unary(op: UnaryOp, v: &Value) -> Result<Value, EvalError> {
    let invalid = || {
        EvalError::TypeError(format!(
            "unary '{}' is not defined for {}",
            op,
            v.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!v.is_truthy())),
        UnaryOp::Plus => match v {
            Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
            _ if v.is_number() => Ok(v.clone()),
            _ => Err(invalid()),
        },
        UnaryOp::Negate => match v {
            Value::Boolean(b) => Ok(Value::Integer(-(*b as i64))),
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| EvalError::Arithmetic("integer overflow in unary '-'".into())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Rational(r) => {
                let (n, d) = r.parts();
                exact(-n, d)
            }
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    #[test]
    fn test_exact_division_collapses() {
        assert_eq!(binary(BinOp::Divide, &int(6), &int(3)).unwrap(), int(2));
        let r = binary(BinOp::Divide, &int(2), &int(-6)).unwrap();
        assert_eq!(r.to_string(), "-1/3");
        let sum = binary(BinOp::Add, &r, &r).unwrap();
        assert_eq!(sum.to_string(), "-2/3");
        let whole = binary(BinOp::Multiply, &sum, &int(3)).unwrap();
        assert!(matches!(whole, Value::Integer(-2)));
    }

    #[test]
    fn test_floor_division_and_modulo() {
        assert_eq!(binary(BinOp::FloorDivide, &int(7), &int(2)).unwrap(), int(3));
        assert_eq!(binary(BinOp::FloorDivide, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinOp::FloorDivide, &int(7), &int(-2)).unwrap(), int(-4));
        assert!(binary(BinOp::FloorDivide, &int(7), &int(0)).is_err());
        assert_eq!(binary(BinOp::Modulo, &int(-7), &int(2)).unwrap(), int(-1));
        assert!(binary(BinOp::Modulo, &int(1), &int(0)).is_err());
        match binary(BinOp::FloorDivide, &Value::Float(7.5), &int(2)).unwrap() {
            Value::Float(f) => assert_eq!(f, 3.0),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_power() {
        assert!(matches!(binary(BinOp::Power, &int(2), &int(10)).unwrap(), Value::Integer(1024)));
        assert_eq!(binary(BinOp::Power, &int(2), &int(-3)).unwrap().to_string(), "1/8");
        assert!(matches!(
            binary(BinOp::Power, &int(4), &Value::Float(0.5)).unwrap(),
            Value::Float(f) if f == 2.0
        ));
        assert!(matches!(
            binary(BinOp::Power, &int(10), &int(40)).unwrap(),
            Value::Float(_)
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let err = binary(BinOp::Add, &int(i64::MAX), &int(1)).unwrap_err();
        assert!(matches!(err, EvalError::Arithmetic(_)));
        assert!(unary(UnaryOp::Negate, &int(i64::MIN)).is_err());
    }

    #[test]
    fn test_strings() {
        let ab = binary(BinOp::Add, &"a".into(), &"b".into()).unwrap();
        assert_eq!(ab, Value::from("ab"));
        assert_eq!(binary(BinOp::Multiply, &int(3), &"ab".into()).unwrap(), Value::from("ababab"));
        assert!(binary(BinOp::Subtract, &"a".into(), &"b".into()).is_err());
        assert_eq!(binary(BinOp::Multiply, &"ab".into(), &int(-1)).unwrap(), Value::from(""));
        assert_eq!(
            binary(BinOp::Matches, &"hello".into(), &"l+".into()).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_oversized_repetition_is_an_error() {
        for n in [i64::MAX, 1 << 40] {
            let err = binary(BinOp::Multiply, &"ab".into(), &int(n)).unwrap_err();
            assert!(matches!(err, EvalError::Arithmetic(_)), "{:?}", err);
            assert!(binary(BinOp::Multiply, &int(n), &"ab".into()).is_err());
        }
        assert_eq!(repeat("", i64::MAX), Some(String::new()));
        assert_eq!(repeat("ab", 2), Some("abab".to_string()));
        assert_eq!(repeat("a", MAX_REPEAT_BYTES as i64 + 1), None);
    }

    #[test]
    fn test_nan_compares_false() {
        let nan = Value::Float(f64::NAN);
        for op in [BinOp::LessThan, BinOp::GreaterEqual] {
            assert_eq!(scalar_binary(op, &nan, &int(1)).unwrap(), Value::Boolean(false));
        }
    }

    #[test]
    fn test_unary_broadcasts() {
        let arr = Value::Array(vec![Value::Boolean(true), int(0), Value::Float(2.5)]);
        assert_eq!(
            unary(UnaryOp::Negate, &arr).unwrap(),
            Value::Array(vec![int(-1), int(0), Value::Float(-2.5)])
        );
        assert_eq!(
            unary(UnaryOp::Not, &arr).unwrap(),
            Value::Array(vec![Value::Boolean(false), Value::Boolean(true), Value::Boolean(false)])
        );
    }

    #[test]
    fn test_object_broadcast_needs_same_keys() {
        let a: Map = [("x".to_string(), int(1)), ("y".to_string(), int(2))].into_iter().collect();
        let b: Map = [("y".to_string(), int(10)), ("x".to_string(), int(20))].into_iter().collect();
        let sum = binary(BinOp::Add, &Value::Object(a.clone()), &Value::Object(b)).unwrap();
        let expected: Map = [("x".to_string(), int(21)), ("y".to_string(), int(12))].into_iter().collect();
        assert_eq!(sum, Value::Object(expected));

        let c: Map = [("x".to_string(), int(1)), ("z".to_string(), int(2))].into_iter().collect();
        assert!(binary(BinOp::Add, &Value::Object(a), &Value::Object(c)).is_err());
    }
}
