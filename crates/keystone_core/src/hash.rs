//! Content digests for emitted plans.
//!
//! A digest is BLAKE3 over the compact JSON encoding of a value. Every map the
//! planner serializes is ordered, so equal values always give equal digests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 digest, serialized as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest raw bytes
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest the canonical JSON encoding of a value
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be encoded as JSON
    pub fn of_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, value)?;
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Lowercase hex rendering
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(hex).map_err(|_| HashError::InvalidHex)?;
        bytes
            .as_slice()
            .try_into()
            .map(Self)
            .map_err(|_| HashError::InvalidLength(bytes.len()))
    }

    /// Leading hex digits, for log lines and terminal output
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for Hash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// Digest parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// Not hex
    #[error("digest is not valid hex")]
    InvalidHex,
    /// Wrong number of bytes
    #[error("digest is {0} bytes, expected 32")]
    InvalidLength(usize),
}
