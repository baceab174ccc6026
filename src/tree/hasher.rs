//! Hash computation for fragments and manifests using BLAKE3

use crate::error::StorageError;
use crate::types::Hash;
use blake3::Hasher;

/// Compute content hash for fragment bytes
///
/// The same function addresses manifests: a root hash is the content hash of
/// the manifest's canonical serialization.
pub fn compute_content_hash(content: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(content);
    *hasher.finalize().as_bytes()
}

/// Check that `content` hashes to `expected`.
pub fn verify_content(expected: &Hash, content: &[u8]) -> Result<(), StorageError> {
    let actual = compute_content_hash(content);
    if actual != *expected {
        return Err(StorageError::StoreCorruption {
            expected: *expected,
            actual,
        });
    }
    Ok(())
}

/// Split file bytes into fixed-size chunks. An empty file has no chunks.
pub fn chunk(content: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    content.chunks(chunk_size.max(1))
}
