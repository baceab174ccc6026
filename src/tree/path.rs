//! Logical path normalization
//!
//! Logical paths are the package-relative names stored in a manifest. They
//! must be identical on every platform, so they are `/`-separated, Unicode
//! NFC, and free of `.`, `..`, empty, and absolute components.

use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a source root on disk so relative paths can be taken from it
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, StorageError> {
    dunce::canonicalize(path)
        .map_err(|e| StorageError::InvalidPath(format!("Failed to canonicalize {:?}: {}", path, e)))
}

/// Compute the logical path of `path` relative to `root`
pub fn logical_path(root: &Path, path: &Path) -> Result<String, StorageError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        StorageError::InvalidPath(format!("{:?} is not under {:?}", path, root))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    StorageError::InvalidPath(format!("Non UTF-8 file name in {:?}", path))
                })?;
                parts.push(name.nfc().collect::<String>());
            }
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "Unexpected component in {:?}",
                    relative
                )))
            }
        }
    }

    if parts.is_empty() {
        return Err(StorageError::InvalidPath(format!(
            "{:?} has no logical name under {:?}",
            path, root
        )));
    }
    Ok(parts.join("/"))
}

/// Normalize a logical path coming from a build file or a manifest
///
/// Backslashes are treated as separators and the result is NFC.
pub fn normalize_logical(path: &str) -> Result<String, StorageError> {
    let unified = path.replace('\\', "/");
    let mut parts = Vec::new();
    for part in unified.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(StorageError::InvalidPath(format!(
                "Invalid logical path: {:?}",
                path
            )));
        }
        parts.push(part.nfc().collect::<String>());
    }
    Ok(parts.join("/"))
}

/// Join a validated logical path onto a destination directory
pub fn resolve_under(destination: &Path, logical: &str) -> Result<PathBuf, StorageError> {
    let normalized = normalize_logical(logical)?;
    if normalized != logical {
        return Err(StorageError::InvalidPath(format!(
            "Logical path is not normalized: {:?}",
            logical
        )));
    }
    let mut target = destination.to_path_buf();
    for part in normalized.split('/') {
        target.push(part);
    }
    Ok(target)
}
