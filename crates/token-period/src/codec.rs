//! Token id packing.
//!
//! The upper 128 bits of a token id hold the period start and the lower 128
//! bits hold the period end, both as unix seconds.

use std::{fmt, str::FromStr};

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Period, PeriodError, Result};

const HALF_BITS: usize = 128;
const HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(U256);

impl TokenId {
    pub fn from_parts(start: u128, end: u128) -> Self {
        TokenId((U256::from(start) << HALF_BITS) | U256::from(end))
    }

    /// The raw `(start, end)` halves.
    pub fn parts(&self) -> (u128, u128) {
        let start = self.0 >> HALF_BITS;
        let end = self.0 & U256::from(u128::MAX);
        (start.to::<u128>(), end.to::<u128>())
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Lowercase, zero padded, 64 hex digits without prefix. This is the
    /// form used for `{id}` substitution in token metadata URIs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes::<32>())
    }

    pub fn to_decimal(&self) -> String {
        self.0.to_string()
    }
}

impl From<U256> for TokenId {
    fn from(value: U256) -> Self {
        TokenId(value)
    }
}

impl From<TokenId> for U256 {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

impl FromStr for TokenId {
    type Err = PeriodError;

    /// Accepts `0x` prefixed hex, the unprefixed 64 digit hex of
    /// [`TokenId::to_hex`], or decimal. An unprefixed string of exactly 64
    /// characters is always read as hex.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let prefixed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
        let (digits, radix) = match prefixed {
            Some(hex_digits) => (hex_digits, 16),
            None if s.len() == HEX_LEN => (s, 16),
            None => (s, 10),
        };
        if digits.is_empty() {
            return Err(PeriodError::InvalidTokenId(s.to_string()));
        }
        let parsed = U256::from_str_radix(digits, radix);
        parsed
            .map(TokenId)
            .map_err(|_| PeriodError::InvalidTokenId(s.to_string()))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub fn encode(period: &Period) -> TokenId {
    // Period timestamps are non-negative by construction.
    TokenId::from_parts(period.start_ts() as u128, period.end_ts() as u128)
}

pub fn decode(id: TokenId) -> Result<Period> {
    let (start, end) = id.parts();
    let start = i64::try_from(start).map_err(|_| PeriodError::TimestampOverflow(start))?;
    let end = i64::try_from(end).map_err(|_| PeriodError::TimestampOverflow(end))?;
    Period::from_bounds(start, end)
}
