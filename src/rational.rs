//! Exact rational arithmetic (L0).
//!
//! A `Rational` is always held in lowest terms with the sign carried by the
//! numerator and a strictly positive denominator — `num_rational::Ratio`
//! already maintains this normal form, so this module is a thin domain
//! wrapper around it plus the two operations the expression language needs
//! that plain `Ratio` doesn't provide: rational exponentiation with
//! corruption tracking, and decimal-to-fraction approximation.

use std::fmt;

use num_integer::Integer;
use num_rational::Ratio;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Result of raising a rational to a rational power (§4.1).
///
/// Exact when the base is a perfect root to the required degree; otherwise
/// the irrational result is carried as a flagged float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowResult {
    Exact(Rational),
    Corrupted(f64),
}

impl PowResult {
    pub fn as_f64(&self) -> f64 {
        match self {
            PowResult::Exact(r) => r.to_f64(),
            PowResult::Corrupted(f) => *f,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, PowResult::Corrupted(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rational(Ratio<i64>);

impl Rational {
    /// Bound on the denominator a decimal approximation may introduce (§4.1).
    pub const MAX_DENOMINATOR: i64 = 10_000;
    /// Tolerance under which an approximation is accepted as "the" value (§4.1).
    pub const APPROX_TOLERANCE: f64 = 1e-10;

    /// Denominators checked before falling back to continued-fraction search;
    /// these cover the overwhelmingly common musical ratios (halves, thirds,
    /// quarters, fifths, sixths, eighths).
    const FAST_DENOMINATORS: [i64; 6] = [2, 3, 4, 5, 6, 8];

    pub const ZERO: Rational = Rational(Ratio::new_raw(0, 1));
    pub const ONE: Rational = Rational(Ratio::new_raw(1, 1));

    /// Construct a reduced rational `num/den`. Panics if `den == 0`, matching
    /// `num_rational::Ratio`'s own contract — callers that might see a zero
    /// denominator (i.e. anything driven by user input) must go through
    /// `checked_new` instead.
    pub fn new(num: i64, den: i64) -> Rational {
        Rational(Ratio::new(num, den))
    }

    pub fn checked_new(num: i64, den: i64) -> Result<Rational, EngineError> {
        if den == 0 {
            return Err(EngineError::DivideByZero);
        }
        Ok(Rational::new(num, den))
    }

    pub fn from_integer(n: i64) -> Rational {
        Rational(Ratio::from_integer(n))
    }

    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn to_f64(&self) -> f64 {
        self.numer() as f64 / self.denom() as f64
    }

    pub fn add(&self, other: Rational) -> Rational {
        Rational(self.0 + other.0)
    }

    pub fn sub(&self, other: Rational) -> Rational {
        Rational(self.0 - other.0)
    }

    pub fn mul(&self, other: Rational) -> Rational {
        Rational(self.0 * other.0)
    }

    pub fn div(&self, other: Rational) -> Result<Rational, EngineError> {
        if other.is_zero() {
            return Err(EngineError::DivideByZero);
        }
        Ok(Rational(self.0 / other.0))
    }

    pub fn neg(&self) -> Rational {
        Rational(-self.0)
    }

    /// Integer power. Total except for `0^negative`, which is division by
    /// zero in disguise (`0^-n == 1/0^n`).
    pub fn pow(&self, exp: i32) -> Result<Rational, EngineError> {
        if exp >= 0 {
            Ok(Rational(self.0.pow(exp)))
        } else {
            if self.is_zero() {
                return Err(EngineError::DivideByZero);
            }
            Ok(Rational(self.0.pow(exp)))
        }
    }

    /// `self ^ (num/den)`. Exact when `self` is a perfect `den`-th power (up
    /// to sign); otherwise the irrational value is returned flagged as
    /// corrupted (§4.1, §4.3).
    pub fn pow_rational(&self, num: i64, den: i64) -> PowResult {
        debug_assert!(den > 0, "rational exponent denominator must be reduced positive");

        if num == 0 {
            return PowResult::Exact(Rational::ONE);
        }
        if den == 1 {
            // Ratio::pow takes i32; guard against exponents that don't fit.
            if let Ok(exp) = i32::try_from(num) {
                if let Ok(r) = self.pow(exp) {
                    return PowResult::Exact(r);
                }
            }
            return PowResult::Corrupted(self.to_f64().powf(num as f64));
        }

        if self.is_zero() {
            return if num > 0 {
                PowResult::Exact(Rational::ZERO)
            } else {
                PowResult::Corrupted(f64::INFINITY)
            };
        }

        if self.numer() < 0 {
            // Roots of negative bases are only exact (and real) for odd
            // denominators; beyond that, degrade to a flagged float rather
            // than attempting complex arithmetic, which this domain has no
            // use for.
            return PowResult::Corrupted(self.to_f64().powf(num as f64 / den as f64));
        }

        let root_num = integer_nth_root(self.numer(), den);
        let root_den = integer_nth_root(self.denom(), den);

        if let (Some(rn), Some(rd)) = (root_num, root_den) {
            let base = Rational::new(rn, rd);
            if let Ok(exp) = i32::try_from(num) {
                if let Ok(r) = base.pow(exp) {
                    return PowResult::Exact(r);
                }
            }
        }

        PowResult::Corrupted(self.to_f64().powf(num as f64 / den as f64))
    }

    /// Approximate a decimal literal as a rational, bounded by
    /// `MAX_DENOMINATOR` and `APPROX_TOLERANCE` (§4.1).
    pub fn from_f64_approx(value: f64) -> Rational {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return Rational::from_integer(value as i64);
        }

        for &den in &Self::FAST_DENOMINATORS {
            let numer = (value * den as f64).round();
            if numer.abs() < i64::MAX as f64 && ((numer / den as f64) - value).abs() < Self::APPROX_TOLERANCE {
                return Rational::new(numer as i64, den);
            }
        }

        continued_fraction_approx(value, Self::MAX_DENOMINATOR, Self::APPROX_TOLERANCE)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ZERO
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer(), self.denom())
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom() == 1 {
            write!(f, "{}", self.numer())
        } else {
            write!(f, "{}/{}", self.numer(), self.denom())
        }
    }
}

impl Serialize for Rational {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{}/{}", self.numer(), self.denom()))
    }
}

impl<'de> Deserialize<'de> for Rational {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut parts = s.splitn(2, '/');
        let num: i64 = parts
            .next()
            .ok_or_else(|| serde::de::Error::custom("empty rational"))?
            .parse()
            .map_err(serde::de::Error::custom)?;
        let den: i64 = match parts.next() {
            Some(d) => d.parse().map_err(serde::de::Error::custom)?,
            None => 1,
        };
        if den == 0 {
            return Err(serde::de::Error::custom("zero denominator"));
        }
        Ok(Rational::new(num, den))
    }
}

/// Largest `n` such that `n^degree <= value`, returned only when that bound
/// is hit exactly (i.e. `value` is a perfect `degree`-th power).
fn integer_nth_root(value: i64, degree: i64) -> Option<i64> {
    if value < 0 || degree <= 0 {
        return None;
    }
    if value == 0 {
        return Some(0);
    }
    let approx = (value as f64).powf(1.0 / degree as f64).round() as i64;
    for candidate in (approx - 1).max(0)..=(approx + 1) {
        if let Some(p) = checked_pow(candidate, degree) {
            if p == value {
                return Some(candidate);
            }
        }
    }
    None
}

fn checked_pow(base: i64, exp: i64) -> Option<i64> {
    let mut result: i64 = 1;
    for _ in 0..exp {
        result = result.checked_mul(base)?;
    }
    Some(result)
}

/// Continued-fraction convergent search, stopping at the first convergent
/// within `tolerance` or at `max_denominator`, whichever comes first.
fn continued_fraction_approx(value: f64, max_denominator: i64, tolerance: f64) -> Rational {
    let sign = if value < 0.0 { -1 } else { 1 };
    let value = value.abs();

    let (mut h_prev, mut h_curr) = (1i64, 0i64);
    let (mut k_prev, mut k_curr) = (0i64, 1i64);
    let mut x = value;

    for _ in 0..64 {
        let a = x.floor();
        let a_i = if a.is_finite() && a.abs() < i64::MAX as f64 {
            a as i64
        } else {
            break;
        };

        let h_next = a_i.saturating_mul(h_curr).saturating_add(h_prev);
        let k_next = a_i.saturating_mul(k_curr).saturating_add(k_prev);

        if k_next > max_denominator || k_next <= 0 {
            break;
        }

        h_prev = h_curr;
        h_curr = h_next;
        k_prev = k_curr;
        k_curr = k_next;

        if (h_curr as f64 / k_curr as f64 - value).abs() < tolerance {
            break;
        }

        let frac = x - a;
        if frac.abs() < 1e-12 {
            break;
        }
        x = 1.0 / frac;
    }

    if k_curr == 0 {
        return Rational::ZERO;
    }
    Rational::new(sign * h_curr, k_curr)
}

/// Reduce `(num, den)` to lowest terms with a positive denominator; used by
/// the compiler when emitting integer-literal constants directly.
pub fn reduce(num: i64, den: i64) -> (i64, i64) {
    if den == 0 {
        return (num, den);
    }
    let g = num.gcd(&den).max(1);
    let (mut n, mut d) = (num / g, den / g);
    if d < 0 {
        n = -n;
        d = -d;
    }
    (n, d)
}
