//! Fragment storage
//!
//! Content-addressed blob storage on the local filesystem. Fragments are
//! stored at paths derived from their hash so lookups are a single stat and
//! identical bytes are stored once.

use crate::error::StorageError;
use crate::tree::hasher;
use crate::types::{short_hex, Hash};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WRITE_LOCK_STRIPES: usize = 64;

/// Content-addressed fragment storage
///
/// Layout: `{root}/fragments/{hex[0..2]}/{hex[2..4]}/{hex}`
///
/// - Writes are atomic (temp file, then rename), so a reader never sees a
///   partially written fragment.
/// - Writes to the same hash are serialized through a striped lock; reads
///   take no lock.
/// - Every read recomputes the hash; a mismatch is reported as corruption.
pub struct FragmentStore {
    root: PathBuf,
    write_locks: Vec<Mutex<()>>,
}

impl FragmentStore {
    /// Open (or create) a fragment store rooted at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();

        let fragments_dir = root.join("fragments");
        fs::create_dir_all(&fragments_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create fragments directory at {:?}: {}",
                    fragments_dir, e
                ),
            ))
        })?;

        let write_locks = (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Ok(Self { root, write_locks })
    }

    /// Store bytes and return their hash
    ///
    /// Idempotent: if the fragment already exists nothing is written.
    pub fn put(&self, bytes: &[u8]) -> Result<Hash, StorageError> {
        let hash = hasher::compute_content_hash(bytes);
        self.write(&hash, bytes)?;
        Ok(hash)
    }

    /// Store bytes received from elsewhere under the hash they claim to have
    ///
    /// Fails with `StoreCorruption` before touching disk if the bytes do not
    /// hash to `expected`.
    pub fn put_verified(&self, expected: &Hash, bytes: &[u8]) -> Result<(), StorageError> {
        hasher::verify_content(expected, bytes)?;
        self.write(expected, bytes)
    }

    /// Retrieve fragment bytes, verifying them against their hash
    pub fn get(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let path = self.fragment_path(hash);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(*hash))
            }
            Err(e) => {
                return Err(StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read fragment from {:?}: {}", path, e),
                )))
            }
        };

        if let Err(e) = hasher::verify_content(hash, &bytes) {
            warn!(fragment = %short_hex(hash), "Fragment failed verification");
            return Err(e);
        }
        Ok(bytes)
    }

    /// Check if a fragment exists
    pub fn has(&self, hash: &Hash) -> bool {
        self.fragment_path(hash).is_file()
    }

    fn write(&self, hash: &Hash, bytes: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_locks[hash[0] as usize % WRITE_LOCK_STRIPES].lock();

        if self.has(hash) {
            debug!(fragment = %short_hex(hash), "Fragment already stored");
            return Ok(());
        }

        let fragment_path = self.fragment_path(hash);
        let temp_path = fragment_path.with_extension(format!("tmp.{}", std::process::id()));

        if let Some(parent) = fragment_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        fs::write(&temp_path, bytes).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write fragment to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &fragment_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", fragment_path, e),
            ))
        })?;

        debug!(fragment = %short_hex(hash), size = bytes.len(), "Stored fragment");
        Ok(())
    }

    /// Compute the filesystem path for a given hash
    fn fragment_path(&self, hash: &Hash) -> PathBuf {
        let hex = hex::encode(hash);
        self.root
            .join("fragments")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }
}
