//! Fixed-point money representation.
//!
//! Every price, cash balance, and P/L value in this crate is a `Micros` —
//! a 1e-6 scale fixed-point `i64` — rather than a float. Indicator math
//! (`btk-indicators`) is the one place IEEE-754 `f64` is mandated; `Micros`
//! converts to and from `f64` only at that boundary.
//!
//! There is no `From<i64>` impl on purpose: callers must be deliberate
//! about when a raw integer represents money.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Micros(i64);

impl Micros {
    pub const SCALE: i64 = 1_000_000;
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);
    pub const MIN: Micros = Micros(i64::MIN);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Parse a decimal string (as returned by a vendor JSON payload) into
    /// `Micros` using exact integer-string arithmetic — no `f64` in the
    /// parse path, so two platforms never disagree on the last micro.
    /// Rejects empty strings, non-digit characters, and more than 6
    /// fractional digits (would require rounding to represent).
    pub fn parse_decimal(s: &str) -> Result<Micros, ParseMicrosError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseMicrosError::Empty);
        }

        let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix('+') {
            (false, rest)
        } else {
            (false, s)
        };

        let bad = || ParseMicrosError::NotNumeric(s.to_string());

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if (!int_part.is_empty() && !all_digits(int_part))
            || (!frac_part.is_empty() && !all_digits(frac_part))
        {
            return Err(bad());
        }
        if frac_part.len() > 6 {
            return Err(ParseMicrosError::TooManyDecimalPlaces(s.to_string()));
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };

        let mut frac_padded = frac_part.to_string();
        while frac_padded.len() < 6 {
            frac_padded.push('0');
        }
        let frac_val: i64 = if frac_padded.is_empty() {
            0
        } else {
            frac_padded.parse().map_err(|_| bad())?
        };

        let micros = int_val
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(bad)?;

        Ok(Micros(if negative { -micros } else { micros }))
    }

    /// Convert from a float, rounding to the nearest micro. Returns `None`
    /// for non-finite input.
    pub fn from_f64(v: f64) -> Option<Micros> {
        if !v.is_finite() {
            return None;
        }
        Some(Micros((v * Self::SCALE as f64).round() as i64))
    }

    /// Convert to `f64` for indicator math and metric reporting. Lossy
    /// beyond 1e-6 precision, which the indicator library tolerates.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply a per-unit price by an integer share quantity. `None` on
    /// overflow — callers must handle it explicitly rather than silently
    /// clamp a trade value.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }

    /// Scale by a float multiplier (e.g. a basis-point slippage factor).
    pub fn mul_f64(self, factor: f64) -> Micros {
        Micros((self.0 as f64 * factor).round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMicrosError {
    Empty,
    NotNumeric(String),
    TooManyDecimalPlaces(String),
}

impl fmt::Display for ParseMicrosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMicrosError::Empty => write!(f, "empty price string"),
            ParseMicrosError::NotNumeric(s) => write!(f, "not a decimal number: {s}"),
            ParseMicrosError::TooManyDecimalPlaces(s) => {
                write!(f, "more than 6 decimal places (ambiguous micro conversion): {s}")
            }
        }
    }
}

impl std::error::Error for ParseMicrosError {}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / Self::SCALE;
        let frac = (self.0 % Self::SCALE).abs();
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}
