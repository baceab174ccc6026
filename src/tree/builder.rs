//! Package builder: source tree or build file to fragment tree and root hash

use crate::buildfile::{BuildFile, Transform};
use crate::error::{ApiError, StorageError};
use crate::store::FragmentStore;
use crate::tree::manifest::{FragmentTree, TreeEntry, META_CHUNK_SIZE};
use crate::tree::path;
use crate::tree::walker::{file_mode, Walker, WalkerConfig};
use crate::types::{short_hex, Hash};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default fragment size: 4 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub const ORIGIN_DIRECTORY: &str = "directory";
pub const ORIGIN_BUILD_FILE: &str = "build-file";

/// What to build from. Exactly one source must be given.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub directory: Option<PathBuf>,
    pub build_file: Option<PathBuf>,
}

/// Result of a build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub root_hash: Hash,
    pub tree: FragmentTree,
}

/// Builds fragment trees, writing every fragment and the manifest into the
/// fragment store
pub struct PackageBuilder {
    store: Arc<FragmentStore>,
    chunk_size: usize,
    walker_config: WalkerConfig,
}

impl PackageBuilder {
    pub fn new(store: Arc<FragmentStore>) -> Self {
        Self::with_options(store, DEFAULT_CHUNK_SIZE, WalkerConfig::default())
    }

    pub fn with_options(
        store: Arc<FragmentStore>,
        chunk_size: usize,
        walker_config: WalkerConfig,
    ) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            walker_config,
        }
    }

    /// Build from an explicit request
    pub fn build(&self, request: &BuildRequest) -> Result<BuildOutput, ApiError> {
        match (&request.directory, &request.build_file) {
            (Some(directory), Some(build_file)) => Err(ApiError::AmbiguousInput {
                directory: directory.clone(),
                build_file: build_file.clone(),
            }),
            (Some(directory), None) => self.build_directory(directory),
            (None, Some(build_file)) => self.build_from_file(build_file),
            (None, None) => Err(ApiError::SourceNotFound(PathBuf::new())),
        }
    }

    /// Build from a path that is either a directory or a build file
    pub fn build_path(&self, source: &Path) -> Result<BuildOutput, ApiError> {
        if source.is_dir() {
            self.build_directory(source)
        } else if source.is_file() {
            self.build_from_file(source)
        } else {
            Err(ApiError::SourceNotFound(source.to_path_buf()))
        }
    }

    /// Build from every file under a directory
    pub fn build_directory(&self, directory: &Path) -> Result<BuildOutput, ApiError> {
        if !directory.is_dir() {
            return Err(ApiError::SourceNotFound(directory.to_path_buf()));
        }
        let root = path::canonicalize_path(directory)?;
        let files = Walker::with_config(root.clone(), self.walker_config.clone()).walk()?;
        debug!(root = %root.display(), files = files.len(), "Building from directory");

        // Distinct names can normalize to one logical path.
        if let Some(pair) = files.windows(2).find(|w| w[0].logical == w[1].logical) {
            return Err(ApiError::DuplicatePath {
                logical: pair[1].logical.clone(),
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }

        let mut tree = FragmentTree::new(ORIGIN_DIRECTORY);
        for file in files {
            let reader = open_source(&file.path)?;
            let (fragments, size) = self.store_stream(reader, &file.path)?;
            tree.insert(
                file.logical,
                TreeEntry {
                    fragments,
                    size,
                    mode: file.mode,
                },
            );
        }

        self.finish(tree)
    }

    /// Build from a YAML or TOML build file
    pub fn build_from_file(&self, build_file: &Path) -> Result<BuildOutput, ApiError> {
        let parsed = BuildFile::load(build_file)?;
        debug!(
            build_file = %build_file.display(),
            entries = parsed.entries.len(),
            "Building from build file"
        );

        let mut tree = FragmentTree::new(ORIGIN_BUILD_FILE);
        for entry in parsed.entries {
            let file = open_source(&entry.source)?;
            let mode = file
                .metadata()
                .map(|m| file_mode(&m))
                .map_err(StorageError::IoError)?;

            let (fragments, size) = match entry.transform {
                Transform::Raw => self.store_stream(file, &entry.source)?,
                transform => {
                    let bytes = read_all(file, &entry.source)?;
                    let bytes = transform.apply(bytes).map_err(|message| {
                        ApiError::ManifestParseError {
                            path: build_file.to_path_buf(),
                            message: format!("{}: {}", entry.source.display(), message),
                        }
                    })?;
                    self.store_stream(bytes.as_slice(), &entry.source)?
                }
            };

            tree.insert(
                entry.logical,
                TreeEntry {
                    fragments,
                    size,
                    mode,
                },
            );
        }

        self.finish(tree)
    }

    /// Chunk a stream into fragments and store each one
    fn store_stream<R: Read>(
        &self,
        mut reader: R,
        source: &Path,
    ) -> Result<(Vec<Hash>, u64), ApiError> {
        let mut fragments = Vec::new();
        let mut size = 0u64;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let filled = fill_buffer(&mut reader, &mut buffer, source)?;
            if filled == 0 {
                break;
            }
            fragments.push(self.store.put(&buffer[..filled])?);
            size += filled as u64;
            if filled < buffer.len() {
                break;
            }
        }

        Ok((fragments, size))
    }

    /// Store the canonical manifest and compute the root hash
    fn finish(&self, mut tree: FragmentTree) -> Result<BuildOutput, ApiError> {
        tree.metadata
            .insert(META_CHUNK_SIZE.to_string(), self.chunk_size.to_string());
        let bytes = tree.canonical_bytes()?;
        let root_hash = self.store.put(&bytes)?;
        info!(
            root = %short_hex(&root_hash),
            files = tree.entries.len(),
            size = tree.total_size(),
            "Built package"
        );
        Ok(BuildOutput { root_hash, tree })
    }
}

fn open_source(source: &Path) -> Result<File, ApiError> {
    File::open(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::SourceNotFound(source.to_path_buf()),
        _ => ApiError::StorageError(StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to open {:?}: {}", source, e),
        ))),
    })
}

fn read_all(mut file: File, source: &Path) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read {:?}: {}", source, e),
        ))
    })?;
    Ok(bytes)
}

/// Read until the buffer is full or the stream ends
fn fill_buffer<R: Read>(reader: &mut R, buffer: &mut [u8], source: &Path) -> Result<usize, ApiError> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read {:?}: {}", source, e),
                ))
                .into())
            }
        }
    }
    Ok(filled)
}
