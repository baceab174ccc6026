//! Filesystem walker for enumerating package sources

use crate::error::StorageError;
use crate::tree::path;
use std::path::PathBuf;
use walkdir::{DirEntry, WalkDir};

/// A regular file found under the source root
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Package-relative logical path
    pub logical: String,
    pub size: u64,
    /// Permission bits, masked to 0o777
    pub mode: u32,
}

/// Filesystem walker configuration
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links (default: false for determinism)
    pub follow_symlinks: bool,
    /// Path components to skip entirely
    pub ignore_patterns: Vec<String>,
    /// Maximum depth to traverse (None = unlimited)
    pub max_depth: Option<usize>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignore_patterns: default_ignore_patterns(),
            max_depth: None,
        }
    }
}

pub fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git".to_string(),
        ".quilt".to_string(),
        "quilt_packages".to_string(),
    ]
}

/// Filesystem walker
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    /// Create a new walker for the given root path
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: WalkerConfig::default(),
        }
    }

    /// Create a walker with custom configuration
    pub fn with_config(root: PathBuf, config: WalkerConfig) -> Self {
        Self { root, config }
    }

    /// Walk the filesystem and collect regular files
    ///
    /// Returns files sorted by logical path, independent of the order the
    /// platform hands out directory entries.
    pub fn walk(&self) -> Result<Vec<SourceFile>, StorageError> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|entry| !self.should_ignore(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk directory: {}", e),
                ))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to read metadata for {:?}: {}", entry.path(), e),
                ))
            })?;

            let path = entry.path().to_path_buf();
            let logical = path::logical_path(&self.root, &path)?;
            files.push(SourceFile {
                path,
                logical,
                size: metadata.len(),
                mode: file_mode(&metadata),
            });
        }

        files.sort_by(|a, b| a.logical.cmp(&b.logical));
        Ok(files)
    }

    /// Check if an entry should be ignored based on ignore patterns
    fn should_ignore(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        self.config
            .ignore_patterns
            .iter()
            .any(|pattern| name == pattern.as_str())
    }
}

#[cfg(unix)]
pub fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
pub fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
