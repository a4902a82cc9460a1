//! Exact fractions for the numeric tower.
//!
//! Integer division and negative integer powers produce a [`Rational`] when
//! the exact result is not a whole number. Construction always reduces by the
//! greatest common divisor and normalizes the sign onto the numerator, so two
//! equal fractions are always stored identically.

use std::{cmp::Ordering, fmt};

use crate::{evaluator::EvalError, value::Value};

/// A fraction `num/den` in lowest terms with `den > 1`.
///
/// A whole-number result is never represented as a `Rational`; see
/// [`Rational::collapse`].
///
/// # Examples
///
/// ```
/// use mace_lang::rational::Rational;
///
/// let r = Rational::new(4, -6).unwrap();
/// assert_eq!(r.numer(), -2);
/// assert_eq!(r.denom(), 3);
/// assert_eq!(r.to_string(), "-2/3");
///
/// // whole numbers are not fractions
/// assert!(Rational::new(6, 3).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Reduces `num/den` and moves the sign onto the numerator.
fn reduce(num: i128, den: i128) -> (i128, i128) {
    let g = gcd(num, den).max(1);
    let (num, den) = (num / g, den / g);
    if den < 0 { (-num, -den) } else { (num, den) }
}

impl Rational {
    /// Builds a fraction, returning `None` for a zero denominator, a whole
    /// number, or a reduced fraction that does not fit in 64 bits.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let (num, den) = reduce(num as i128, den as i128);
        if den == 1 {
            return None;
        }
        Some(Rational {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Turns an exact quotient into the narrowest value that holds it:
    /// an `Integer` when the quotient is whole, otherwise a `Rational`.
    ///
    /// A zero denominator follows float semantics (`±Infinity` or `NaN`) so
    /// that `1/0` behaves the same whether or not the operands were exact.
    pub(crate) fn collapse(num: i128, den: i128) -> Result<Value, EvalError> {
        if den == 0 {
            return Ok(Value::Float(num as f64 / 0.0));
        }
        let (num, den) = reduce(num, den);
        let overflow = || EvalError::Arithmetic(format!("{}/{} does not fit in 64 bits", num, den));
        let n = i64::try_from(num).map_err(|_| overflow())?;
        if den == 1 {
            return Ok(Value::Integer(n));
        }
        let d = i64::try_from(den).map_err(|_| overflow())?;
        Ok(Value::Rational(Rational { num: n, den: d }))
    }

    /// Numerator and denominator widened for intermediate arithmetic.
    pub(crate) fn parts(&self) -> (i128, i128) {
        (self.num as i128, self.den as i128)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        // denominators are positive, so cross-multiplying keeps the order
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        (a * d).cmp(&(c * b))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reduces_and_normalizes_sign() {
        let r = Rational::new(10, -4).unwrap();
        assert_eq!((r.numer(), r.denom()), (-5, 2));

        let r = Rational::new(-3, -9).unwrap();
        assert_eq!((r.numer(), r.denom()), (1, 3));
    }

    #[test]
    fn test_new_rejects_whole_and_zero_denominator() {
        assert!(Rational::new(8, 4).is_none());
        assert!(Rational::new(0, 5).is_none());
        assert!(Rational::new(1, 0).is_none());
    }

    #[test]
    fn test_collapse() {
        assert_eq!(Rational::collapse(6, 3).unwrap(), Value::Integer(2));
        match Rational::collapse(2, 6).unwrap() {
            Value::Rational(r) => assert_eq!(r.to_string(), "1/3"),
            other => panic!("expected rational, got {:?}", other),
        }
        match Rational::collapse(1, 0).unwrap() {
            Value::Float(f) => assert!(f.is_infinite() && f > 0.0),
            other => panic!("expected infinity, got {:?}", other),
        }
        assert!(Rational::collapse(i128::MAX / 3, 7).is_err());
    }

    #[test]
    fn test_ordering() {
        let third = Rational::new(1, 3).unwrap();
        let half = Rational::new(1, 2).unwrap();
        let neg = Rational::new(-7, 2).unwrap();
        assert!(third < half);
        assert!(neg < third);
    }
}
