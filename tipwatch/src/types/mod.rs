//! Core domain types used by the monitor.
//!
//! This module defines the strongly-typed block identifier and the block
//! record observed from the remote chain. The goal is to avoid "naked"
//! hex strings and byte buffers in public APIs and instead use
//! domain-specific newtypes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Observed block records.
pub mod block;

pub use block::Block;

/// Length in bytes of a block identifier.
pub const HASH_LEN: usize = 32;

/// Amount in the chain's smallest unit (satoshis for Bitcoin).
pub type Sats = u64;

/// Strongly-typed block identifier.
///
/// The monitor never interprets the bytes: a `BlockHash` is an opaque,
/// fixed-length token compared only for equality. Its text form is the
/// lowercase hex encoding used by the remote API, byte order preserved.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockHash(pub [u8; HASH_LEN]);

impl BlockHash {
    /// Derives a [`BlockHash`] as the BLAKE3-256 digest of `data`.
    ///
    /// Used to mint deterministic identifiers for simulated chains.
    pub fn digest(data: &[u8]) -> Self {
        BlockHash(*blake3::hash(data).as_bytes())
    }

    /// Returns the underlying 32 bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns the lowercase hex encoding of this identifier.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// Error returned when parsing a [`BlockHash`] from text.
#[derive(Debug, thiserror::Error)]
pub enum ParseHashError {
    #[error("invalid hex in block hash: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("block hash must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for BlockHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let len = bytes.len();
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| ParseHashError::Length(len))?;
        Ok(BlockHash(arr))
    }
}

impl TryFrom<String> for BlockHash {
    type Error = ParseHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlockHash> for String {
    fn from(hash: BlockHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

    #[test]
    fn parses_and_displays_hex() {
        let hash: BlockHash = GENESIS.parse().expect("valid hash");
        assert_eq!(hash.to_string(), GENESIS);
        assert_eq!(hash.short(), "00000000");
    }

    #[test]
    fn rejects_wrong_length_and_bad_hex() {
        assert!(matches!(
            "abcd".parse::<BlockHash>(),
            Err(ParseHashError::Length(2))
        ));
        assert!(matches!(
            "zz".parse::<BlockHash>(),
            Err(ParseHashError::Hex(_))
        ));
    }

    #[test]
    fn serde_uses_hex_string_form() {
        let hash = BlockHash::digest(b"tip");
        let json = serde_json::to_string(&hash).expect("serialize");
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let back: BlockHash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hash);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(BlockHash::digest(b"a"), BlockHash::digest(b"a"));
        assert_ne!(BlockHash::digest(b"a"), BlockHash::digest(b"b"));
    }
}
