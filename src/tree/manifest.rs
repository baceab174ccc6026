//! Fragment tree (package manifest) and its canonical serialization
//!
//! The canonical form is compact JSON with sorted maps and hex hashes. The
//! root hash of a package is the BLAKE3 hash of exactly those bytes, which
//! lets the manifest live in the fragment store like any other blob.

use crate::error::ApiError;
use crate::tree::{hasher, path};
use crate::types::{hex_hash_vec, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Manifest format written by this version
pub const MANIFEST_FORMAT: &str = "1";

pub const META_FORMAT: &str = "format";
pub const META_ORIGIN: &str = "origin";
pub const META_CHUNK_SIZE: &str = "chunk_size";

/// One logical file of the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Fragment hashes in file order; empty for an empty file
    #[serde(with = "hex_hash_vec")]
    pub fragments: Vec<Hash>,
    pub size: u64,
    pub mode: u32,
}

/// Ordered mapping of logical paths to fragments, plus package metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FragmentTree {
    pub entries: BTreeMap<String, TreeEntry>,
    pub metadata: BTreeMap<String, String>,
}

impl FragmentTree {
    pub fn new(origin: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_FORMAT.to_string(), MANIFEST_FORMAT.to_string());
        metadata.insert(META_ORIGIN.to_string(), origin.to_string());
        Self {
            entries: BTreeMap::new(),
            metadata,
        }
    }

    pub fn insert(&mut self, logical: String, entry: TreeEntry) {
        self.entries.insert(logical, entry);
    }

    /// Canonical bytes the root hash is computed over
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ApiError> {
        serde_json::to_vec(self)
            .map_err(|e| ApiError::Serialization(format!("Failed to serialize manifest: {}", e)))
    }

    pub fn root_hash(&self) -> Result<Hash, ApiError> {
        Ok(hasher::compute_content_hash(&self.canonical_bytes()?))
    }

    /// Parse manifest bytes fetched under `root`
    ///
    /// Verifies the bytes hash to `root`, that they are in canonical form, and
    /// that every logical path is safe to materialize.
    pub fn from_bytes(root: &Hash, bytes: &[u8]) -> Result<Self, ApiError> {
        hasher::verify_content(root, bytes)?;

        let tree: FragmentTree =
            serde_json::from_slice(bytes).map_err(|e| ApiError::InvalidManifest {
                root: *root,
                message: e.to_string(),
            })?;

        if tree.canonical_bytes()? != bytes {
            return Err(ApiError::InvalidManifest {
                root: *root,
                message: "manifest is not in canonical form".to_string(),
            });
        }

        let chunk_size = tree.chunk_size();
        for (logical, entry) in &tree.entries {
            if let Some(chunk_size) = chunk_size {
                let expected = entry.size.div_ceil(chunk_size as u64);
                if entry.fragments.len() as u64 != expected {
                    return Err(ApiError::InvalidManifest {
                        root: *root,
                        message: format!(
                            "{:?} has {} fragments, expected {} for {} bytes in {}-byte chunks",
                            logical,
                            entry.fragments.len(),
                            expected,
                            entry.size,
                            chunk_size
                        ),
                    });
                }
            }

            let normalized =
                path::normalize_logical(logical).map_err(|e| ApiError::InvalidManifest {
                    root: *root,
                    message: e.to_string(),
                })?;
            if &normalized != logical {
                return Err(ApiError::InvalidManifest {
                    root: *root,
                    message: format!("non-normalized path {:?}", logical),
                });
            }
        }

        Ok(tree)
    }

    /// Distinct fragment hashes referenced by the tree, sorted
    pub fn fragment_hashes(&self) -> BTreeSet<Hash> {
        self.entries
            .values()
            .flat_map(|entry| entry.fragments.iter().copied())
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    pub fn origin(&self) -> Option<&str> {
        self.metadata.get(META_ORIGIN).map(String::as_str)
    }

    /// Fragment size the tree was chunked with, if recorded
    pub fn chunk_size(&self) -> Option<usize> {
        self.metadata
            .get(META_CHUNK_SIZE)
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
    }
}
