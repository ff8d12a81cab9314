//! Token amounts denominated in attoFIL.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};

use super::ParseError;

/// Number of attoFIL in one FIL.
pub const ATTO_PER_FIL: u64 = 1_000_000_000_000_000_000;

const FIL_DECIMALS: usize = 18;

/// Arbitrary-precision token amount in attoFIL.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TokenAmount(BigInt);

impl TokenAmount {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn from_atto(atto: impl Into<BigInt>) -> Self {
        Self(atto.into())
    }

    pub fn from_nano(nano: u64) -> Self {
        Self(BigInt::from(nano) * 1_000_000_000u64)
    }

    pub fn from_whole(fil: u64) -> Self {
        Self(BigInt::from(fil) * ATTO_PER_FIL)
    }

    pub fn atto(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Parses a plain non-negative integer amount of attoFIL, the form used
    /// for gas prices on the wire and on the command line.
    pub fn parse_atto(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::Amount(format!(
                "{s:?} is not a non-negative integer attoFIL amount"
            )));
        }
        let value = s
            .parse::<BigInt>()
            .map_err(|e| ParseError::Amount(format!("{s:?}: {e}")))?;
        Ok(Self(value))
    }

    /// Parses a human-entered decimal amount such as `"1.5"`, `"1.5 FIL"`
    /// or `"250 nanoFIL"`. Without a unit the amount is in FIL.
    pub fn parse_fil(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        let split_at = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split_at);
        let number = number.trim();

        let decimals = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "fil" => FIL_DECIMALS,
            "millifil" => FIL_DECIMALS - 3,
            "microfil" => FIL_DECIMALS - 6,
            "nanofil" => FIL_DECIMALS - 9,
            "picofil" => FIL_DECIMALS - 12,
            "femtofil" => FIL_DECIMALS - 15,
            "attofil" => 0,
            other => {
                return Err(ParseError::Amount(format!("unknown unit {other:?} in {s:?}")));
            }
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        let digits_ok = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_ok(whole) || !digits_ok(frac) {
            return Err(ParseError::Amount(format!("{s:?} is not a decimal amount")));
        }
        if frac.len() > decimals {
            return Err(ParseError::Amount(format!(
                "{s:?} has more than {decimals} fractional digits"
            )));
        }

        let mut atto_digits = String::with_capacity(whole.len() + decimals);
        atto_digits.push_str(whole);
        atto_digits.push_str(frac);
        atto_digits.extend(std::iter::repeat_n('0', decimals - frac.len()));

        let value = atto_digits
            .parse::<BigInt>()
            .map_err(|e| ParseError::Amount(format!("{s:?}: {e}")))?;
        Ok(Self(value))
    }

    /// Filecoin big-int byte encoding: empty for zero, otherwise a sign byte
    /// (0 positive, 1 negative) followed by the big-endian magnitude.
    pub fn to_cbor_bytes(&self) -> Vec<u8> {
        let (sign, magnitude) = self.0.to_bytes_be();
        match sign {
            Sign::NoSign => Vec::new(),
            Sign::Plus => [&[0u8][..], &magnitude].concat(),
            Sign::Minus => [&[1u8][..], &magnitude].concat(),
        }
    }

    pub fn from_cbor_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        match bytes.split_first() {
            None => Ok(Self::zero()),
            Some((0, magnitude)) => Ok(Self(BigInt::from_bytes_be(Sign::Plus, magnitude))),
            Some((1, magnitude)) => Ok(Self(BigInt::from_bytes_be(Sign::Minus, magnitude))),
            Some((other, _)) => Err(ParseError::Amount(format!(
                "invalid big-int sign byte {other}"
            ))),
        }
    }

    /// Renders the amount in FIL with trailing zeros trimmed, e.g. `1.5 FIL`.
    pub fn to_fil_string(&self) -> String {
        let digits = self.0.abs().to_string();
        let padded = format!("{digits:0>width$}", width = FIL_DECIMALS + 1);
        let (whole, frac) = padded.split_at(padded.len() - FIL_DECIMALS);
        let frac = frac.trim_end_matches('0');
        let sign = if self.is_negative() { "-" } else { "" };
        if frac.is_empty() {
            format!("{sign}{whole} FIL")
        } else {
            format!("{sign}{whole}.{frac} FIL")
        }
    }
}

/// Displays the raw attoFIL integer, the form expected by node APIs.
impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(atto: u64) -> Self {
        Self(BigInt::from(atto))
    }
}

impl Add for &TokenAmount {
    type Output = TokenAmount;
    fn add(self, rhs: Self) -> TokenAmount {
        TokenAmount(&self.0 + &rhs.0)
    }
}

impl Sub for &TokenAmount {
    type Output = TokenAmount;
    fn sub(self, rhs: Self) -> TokenAmount {
        TokenAmount(&self.0 - &rhs.0)
    }
}

impl Mul<i64> for &TokenAmount {
    type Output = TokenAmount;
    fn mul(self, rhs: i64) -> TokenAmount {
        TokenAmount(&self.0 * rhs)
    }
}

impl Mul<u64> for &TokenAmount {
    type Output = TokenAmount;
    fn mul(self, rhs: u64) -> TokenAmount {
        TokenAmount(&self.0 * rhs)
    }
}

/// Integer division truncating toward zero. Panics on a zero divisor.
impl Div<u64> for &TokenAmount {
    type Output = TokenAmount;
    fn div(self, rhs: u64) -> TokenAmount {
        TokenAmount(&self.0 / rhs)
    }
}

impl Div<i64> for &TokenAmount {
    type Output = TokenAmount;
    fn div(self, rhs: i64) -> TokenAmount {
        TokenAmount(&self.0 / rhs)
    }
}
