//! Utility functions useful throughout the codebase.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::constant::ADDRESS_WIDTH_BYTES;

/// A type alias to make [`U256Wrapper`] easier to type internally.
pub type U256W = U256Wrapper;

/// The `U256Wrapper` is responsible for allowing the serialisation of the
/// [`U256`] type to JSON as `0x`-prefixed big-endian hex.
///
/// It provides reasonable conversions from a number of common types used
/// within the library, and tolerant parsing from both hexadecimal and
/// decimal string representations as they appear in snapshot documents.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct U256Wrapper(pub U256);

impl U256Wrapper {
    /// The zero word.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Parses a wrapper from a string that is either `0x`-prefixed
    /// hexadecimal or plain decimal.
    ///
    /// Returns [`None`] if the string is neither.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if let Some(hex_digits) = trimmed.strip_prefix("0x") {
            U256::from_str_radix(hex_digits, 16).ok().map(Self)
        } else {
            U256::from_str_radix(trimmed, 10).ok().map(Self)
        }
    }

    /// Checks whether the wrapped word is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }

    /// Computes the absolute difference between `self` and `other`.
    #[must_use]
    pub fn abs_diff(&self, other: &Self) -> Self {
        if self.0 >= other.0 {
            Self(self.0 - other.0)
        } else {
            Self(other.0 - self.0)
        }
    }

    /// Converts the wrapped word to an `f64`, losing precision for values
    /// beyond the mantissa range.
    ///
    /// This is only ever used for ratio computation and tier classification,
    /// where the loss of low-order bits on astronomically large values is
    /// immaterial.
    #[must_use]
    pub fn to_f64_lossy(&self) -> f64 {
        self.0
            .to_be_bytes()
            .iter()
            .fold(0.0f64, |acc, byte| acc * 256.0 + f64::from(*byte))
    }

    /// Checks whether the wrapped word has the shape of an address: all of
    /// the high 12 bytes zero and at least one nonzero byte among the low
    /// [`ADDRESS_WIDTH_BYTES`].
    #[must_use]
    pub fn has_address_shape(&self) -> bool {
        let bytes = self.0.to_be_bytes();
        let (high, low) = bytes.split_at(32 - ADDRESS_WIDTH_BYTES);
        high.iter().all(|b| *b == 0) && low.iter().filter(|b| **b != 0).count() >= 4
    }

    /// Renders the wrapped word as the low-20-byte address it encodes, in
    /// lowercase `0x`-prefixed hex.
    #[must_use]
    pub fn as_address_string(&self) -> String {
        let bytes = self.0.to_be_bytes();
        format!("0x{}", hex::encode(&bytes[32 - ADDRESS_WIDTH_BYTES..]))
    }
}

impl Debug for U256Wrapper {
    /// The wrapper has absolutely no semantic meaning, so we print the
    /// underlying value for the debug representation.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for U256Wrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for U256Wrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256Wrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<U256> for U256Wrapper {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<U256Wrapper> for U256 {
    fn from(U256Wrapper(value): U256Wrapper) -> Self {
        value
    }
}

impl From<u64> for U256Wrapper {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for U256Wrapper {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<usize> for U256Wrapper {
    fn from(value: usize) -> Self {
        Self(U256::from(value as u128))
    }
}

impl Serialize for U256Wrapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = String::from("0x");
        value.push_str(&hex::encode(self.0.to_be_bytes()));

        serializer.serialize_str(&value)
    }
}

impl<'de> Deserialize<'de> for U256Wrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid 256-bit value `{s}`")))
    }
}

/// Computes `keccak256` over the provided `data`, returning the digest as a
/// word.
#[must_use]
pub fn keccak256_word(data: &[u8]) -> U256Wrapper {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest: [u8; 32] = hasher.finalize().into();
    U256Wrapper(U256::from_be_bytes(digest))
}

/// Normalises an address string to its canonical lowercase `0x`-prefixed
/// form.
///
/// Returns [`None`] when the input is not 20 bytes of hex.
#[must_use]
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.len() != ADDRESS_WIDTH_BYTES * 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    Some(format!("0x{}", digits.to_ascii_lowercase()))
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use super::{normalize_address, U256Wrapper};

    #[test]
    fn parses_decimal_and_hex_forms() {
        let from_dec = U256Wrapper::parse("1000").unwrap();
        let from_hex = U256Wrapper::parse("0x3e8").unwrap();
        assert_eq!(from_dec, from_hex);
        assert_eq!(from_dec.0, U256::from(1000u32));
    }

    #[test]
    fn rejects_garbage() {
        assert!(U256Wrapper::parse("0xzz").is_none());
        assert!(U256Wrapper::parse("ten").is_none());
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = U256Wrapper::from(1500u64);
        let b = U256Wrapper::from(1000u64);
        assert_eq!(a.abs_diff(&b), U256Wrapper::from(500u64));
        assert_eq!(b.abs_diff(&a), U256Wrapper::from(500u64));
    }

    #[test]
    fn lossy_float_conversion_is_exact_for_small_words() {
        let value = U256Wrapper::from(123_456_789u64);
        assert_eq!(value.to_f64_lossy(), 123_456_789.0);
    }

    #[test]
    fn recognises_address_shaped_words() {
        let address =
            U256Wrapper::parse("0x000000000000000000000000dac17f958d2ee523a2206206994597c13d831ec7")
                .unwrap();
        assert!(address.has_address_shape());
        assert_eq!(
            address.as_address_string(),
            "0xdac17f958d2ee523a2206206994597c13d831ec7"
        );

        let counter = U256Wrapper::from(42u64);
        assert!(!counter.has_address_shape());
    }

    #[test]
    fn normalises_address_casing() {
        assert_eq!(
            normalize_address("0xDAC17F958D2ee523a2206206994597C13D831ec7").as_deref(),
            Some("0xdac17f958d2ee523a2206206994597c13d831ec7")
        );
        assert!(normalize_address("0x1234").is_none());
    }
}
