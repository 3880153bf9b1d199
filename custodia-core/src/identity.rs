//! Principal and token identities.
//!
//! Owners, agents, recipients, and token contracts are all identified by
//! 20-byte account addresses that arrive from the surrounding application as
//! hex strings in whatever casing the wallet produced. Addresses are
//! normalized exactly once, here, at the boundary; everywhere else they are
//! compared byte-wise. This removes the entire class of "case-insensitive
//! compare forgotten at one call site" bugs.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an account address in bytes.
pub const ADDRESS_BYTES: usize = 20;

/// A canonical account identity.
///
/// Parsed from `0x`-prefixed hex (the prefix is optional, casing is
/// ignored), stored as raw bytes, displayed as lowercase hex.
///
/// The all-zero address is the *null identity*: it is what a revoked
/// delegation's agent slot holds, and it is never a valid agent or
/// recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    /// Parse an address from a hex string, normalizing it.
    ///
    /// Accepts `0x`-prefixed or bare hex, any casing. Returns
    /// `InvalidAddress` for anything that is not exactly 20 bytes of hex.
    pub fn parse(input: &str) -> Result<Self> {
        let hex_part = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(hex_part).map_err(|e| Error::InvalidAddress {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        let bytes: [u8; ADDRESS_BYTES] =
            bytes.try_into().map_err(|v: Vec<u8>| Error::InvalidAddress {
                input: input.to_string(),
                reason: format!("expected {} bytes, got {}", ADDRESS_BYTES, v.len()),
            })?;
        Ok(Self(bytes))
    }

    /// Construct an address directly from raw bytes.
    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    /// The all-zero null identity.
    pub fn null() -> Self {
        Self([0u8; ADDRESS_BYTES])
    }

    /// Whether this is the null identity.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; ADDRESS_BYTES]
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}
