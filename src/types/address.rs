//! Facet and proxy addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CutError;

/// Width of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte contract address.
///
/// The all-zero address is the null facet: `Remove` cuts target it, and the
/// registry never stores it as an owner.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FacetAddress([u8; ADDRESS_LEN]);

impl FacetAddress {
    /// The null address.
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte` (handy for fixtures).
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; ADDRESS_LEN])
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the null address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex. Accepts an optional `0x` prefix and any letter case
    /// (checksummed addresses are accepted but the checksum is not verified).
    pub fn from_hex(s: &str) -> Result<Self, CutError> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(CutError::InvalidAddress(format!(
                "{s}: expected {} hex digits",
                ADDRESS_LEN * 2
            )));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| CutError::InvalidAddress(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for FacetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacetAddress({})", self.to_hex())
    }
}

impl fmt::Display for FacetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for FacetAddress {
    type Err = CutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for FacetAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FacetAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
