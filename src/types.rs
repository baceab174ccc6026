//! Core identifier types shared across the crate.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// BLAKE3 digest of a fragment or of a canonical manifest.
pub type Hash = [u8; 32];

/// Number of hex characters shown in human-facing output.
pub const SHORT_HASH_LEN: usize = 12;

/// Render a hash as lowercase hex.
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Abbreviated hex form for tables and log lines.
pub fn short_hex(hash: &Hash) -> String {
    let mut s = hex::encode(hash);
    s.truncate(SHORT_HASH_LEN);
    s
}

/// Parse a full 64-character hex hash.
pub fn parse_hash(input: &str) -> Result<Hash, ApiError> {
    let trimmed = input.trim();
    if trimmed.len() != 64 {
        return Err(ApiError::InvalidHash(input.to_string()));
    }
    let bytes = hex::decode(trimmed).map_err(|_| ApiError::InvalidHash(input.to_string()))?;
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

/// Serde adapter storing a `Hash` as a hex string.
pub mod hex_hash {
    use super::Hash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        if bytes.len() != 32 {
            return Err(D::Error::custom(format!(
                "expected 32-byte hash, got {} bytes",
                bytes.len()
            )));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(hash)
    }
}

/// Serde adapter for a list of hex hashes.
pub mod hex_hash_vec {
    use super::Hash;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hashes: &[Hash], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
        for hash in hashes {
            seq.serialize_element(&hex::encode(hash))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| {
                let bytes = hex::decode(s).map_err(D::Error::custom)?;
                if bytes.len() != 32 {
                    return Err(D::Error::custom("expected 32-byte hash"));
                }
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(hash)
            })
            .collect()
    }
}

/// Identity of a logical package: `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRef {
    pub owner: String,
    pub name: String,
}

impl PackageRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, ApiError> {
        let owner = owner.into();
        let name = name.into();
        let full = format!("{}/{}", owner, name);
        if !valid_component(&owner) || !valid_component(&name) {
            return Err(ApiError::InvalidPackageRef(full));
        }
        Ok(Self { owner, name })
    }
}

fn valid_component(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for PackageRef {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) => PackageRef::new(owner, name),
            None => Err(ApiError::InvalidPackageRef(s.to_string())),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
