//! Install: resolve, fetch what is missing, materialize on disk
//!
//! Every target is checked before anything is written. A target that exists
//! and is not a byte-identical regular file is a conflict; without `force`
//! any conflict aborts the install with the destination untouched. A
//! byte-identical file whose permissions differ only has its mode fixed.
//!
//! Files are written through a temp file and a rename, so no target is ever
//! half-written. A failure part way through leaves some files installed and
//! the rest untouched; there is no rollback.

use super::{bounded, SyncOptions};
use crate::error::{ApiError, RegistryError, StorageError};
use crate::registry::RegistryClient;
use crate::resolve::{resolve, Selector};
use crate::session::Session;
use crate::store::FragmentStore;
use crate::tree::hasher;
use crate::tree::manifest::{FragmentTree, TreeEntry};
use crate::tree::path;
use crate::types::{short_hex, Hash, PackageRef};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub root_hash: Hash,
    pub files_written: usize,
    /// Targets already byte-identical to the package
    pub files_unchanged: usize,
    /// Fragments fetched from the registry
    pub downloaded: usize,
    /// Fragments served from the local store
    pub reused: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetState {
    Absent,
    Identical,
    /// Same bytes, different permissions
    ModeDiffers,
    Conflict,
}

struct PlannedFile<'a> {
    target: PathBuf,
    entry: &'a TreeEntry,
    state: TargetState,
}

/// Install `package` at `selector` into `destination`
#[allow(clippy::too_many_arguments)]
pub async fn install(
    client: &dyn RegistryClient,
    store: &FragmentStore,
    session: &Session,
    package: &PackageRef,
    selector: &Selector,
    destination: &Path,
    force: bool,
    options: &SyncOptions,
) -> Result<InstallReport, ApiError> {
    let root_hash = resolve(client, session, package, selector).await?;
    let tree = load_manifest(client, store, session, package, &root_hash, options).await?;

    let plan = plan_targets(&tree, destination)?;
    if !force {
        if let Some(conflict) = plan.iter().find(|p| p.state == TargetState::Conflict) {
            return Err(ApiError::WouldOverwrite(conflict.target.clone()));
        }
    }

    let needed: BTreeSet<Hash> = plan
        .iter()
        .filter(|p| matches!(p.state, TargetState::Absent | TargetState::Conflict))
        .flat_map(|p| p.entry.fragments.iter().copied())
        .collect();
    let missing: Vec<Hash> = needed.iter().filter(|h| !store.has(h)).copied().collect();
    debug!(
        package = %package,
        needed = needed.len(),
        missing = missing.len(),
        "Fragment fetch plan computed"
    );

    stream::iter(missing.iter().map(|hash| async move {
        let bytes = bounded(
            options.timeout,
            client.download_fragment(session, package, hash),
        )
        .await?;
        let actual = hasher::compute_content_hash(&bytes);
        if actual != *hash {
            return Err(ApiError::from(RegistryError::HashMismatch {
                expected: *hash,
                actual,
            }));
        }
        store.put_verified(hash, &bytes)?;
        debug!(hash = %short_hex(hash), "Downloaded fragment");
        Ok::<(), ApiError>(())
    }))
    .buffer_unordered(options.concurrency.max(1))
    .try_collect::<Vec<()>>()
    .await?;

    fs::create_dir_all(destination).map_err(|e| io_context(e, "create", destination))?;

    let mut files_written = 0;
    let mut files_unchanged = 0;
    for planned in &plan {
        match planned.state {
            TargetState::Identical => files_unchanged += 1,
            TargetState::ModeDiffers => {
                set_mode(&planned.target, planned.entry.mode)?;
                debug!(
                    target = %planned.target.display(),
                    mode = %format!("{:o}", planned.entry.mode),
                    "Fixed file mode"
                );
                files_written += 1;
            }
            TargetState::Conflict => {
                warn!(target = %planned.target.display(), "Overwriting existing path");
                clear_conflict(destination, &planned.target)?;
                write_file(store, &planned.target, planned.entry)?;
                files_written += 1;
            }
            TargetState::Absent => {
                write_file(store, &planned.target, planned.entry)?;
                files_written += 1;
            }
        }
    }

    let report = InstallReport {
        root_hash,
        files_written,
        files_unchanged,
        downloaded: missing.len(),
        reused: needed.len() - missing.len(),
    };
    info!(
        package = %package,
        root = %short_hex(&root_hash),
        destination = %destination.display(),
        written = report.files_written,
        downloaded = report.downloaded,
        "Installed package"
    );
    Ok(report)
}

/// Load the manifest for `root`, from the local store when present
async fn load_manifest(
    client: &dyn RegistryClient,
    store: &FragmentStore,
    session: &Session,
    package: &PackageRef,
    root: &Hash,
    options: &SyncOptions,
) -> Result<FragmentTree, ApiError> {
    if store.has(root) {
        let bytes = store.get(root)?;
        return FragmentTree::from_bytes(root, &bytes);
    }

    let bytes = bounded(
        options.timeout,
        client.download_manifest(session, package, root),
    )
    .await?;
    let actual = hasher::compute_content_hash(&bytes);
    if actual != *root {
        return Err(RegistryError::HashMismatch {
            expected: *root,
            actual,
        }
        .into());
    }
    let tree = FragmentTree::from_bytes(root, &bytes)?;
    store.put_verified(root, &bytes)?;
    Ok(tree)
}

fn plan_targets<'a>(
    tree: &'a FragmentTree,
    destination: &Path,
) -> Result<Vec<PlannedFile<'a>>, ApiError> {
    let chunk_size = tree.chunk_size();
    tree.entries
        .iter()
        .map(|(logical, entry)| {
            let target = path::resolve_under(destination, logical)?;
            let state = target_state(destination, &target, entry, chunk_size)?;
            Ok(PlannedFile {
                target,
                entry,
                state,
            })
        })
        .collect()
}

fn target_state(
    destination: &Path,
    target: &Path,
    entry: &TreeEntry,
    chunk_size: Option<usize>,
) -> Result<TargetState, ApiError> {
    // A file where a parent directory must go blocks the write too.
    // Walk top-down so the first missing directory ends the scan.
    for ancestor in parents_below(destination, target) {
        match fs::symlink_metadata(ancestor) {
            Ok(meta) if !meta.is_dir() => return Ok(TargetState::Conflict),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TargetState::Absent),
            Err(e) => return Err(io_context(e, "inspect", ancestor).into()),
        }
    }

    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TargetState::Absent),
        Err(e) => return Err(io_context(e, "inspect", target).into()),
    };
    if !meta.is_file() || meta.len() != entry.size {
        return Ok(TargetState::Conflict);
    }

    let chunk_size = match chunk_size {
        Some(size) => size,
        None if entry.fragments.len() <= 1 => entry.size.max(1) as usize,
        None => return Ok(TargetState::Conflict),
    };
    if !matches_fragments(target, entry, chunk_size)? {
        Ok(TargetState::Conflict)
    } else if mode_matches(&meta, entry.mode) {
        Ok(TargetState::Identical)
    } else {
        Ok(TargetState::ModeDiffers)
    }
}

#[cfg(unix)]
fn mode_matches(meta: &fs::Metadata, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777 == mode & 0o777
}

#[cfg(not(unix))]
fn mode_matches(_meta: &fs::Metadata, _mode: u32) -> bool {
    true
}

/// Hash an existing file in `chunk_size` pieces and compare to the entry
///
/// The buffer never exceeds the entry's size, whatever the manifest claims.
fn matches_fragments(target: &Path, entry: &TreeEntry, chunk_size: usize) -> Result<bool, ApiError> {
    let mut file = File::open(target).map_err(|e| io_context(e, "open", target))?;
    let capacity = usize::try_from(entry.size).unwrap_or(usize::MAX);
    let mut buffer = vec![0u8; chunk_size.min(capacity).max(1)];
    let mut expected = entry.fragments.iter();
    loop {
        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_context(e, "read", target).into()),
            }
        }
        if filled == 0 {
            return Ok(expected.next().is_none());
        }
        match expected.next() {
            Some(hash) if *hash == hasher::compute_content_hash(&buffer[..filled]) => {}
            _ => return Ok(false),
        }
        if filled < buffer.len() {
            return Ok(expected.next().is_none());
        }
    }
}

/// Directories between `destination` and `target`, outermost first
fn parents_below<'a>(destination: &Path, target: &'a Path) -> Vec<&'a Path> {
    let mut parents: Vec<&Path> = target
        .ancestors()
        .skip(1)
        .take_while(|a| *a != destination && a.starts_with(destination))
        .collect();
    parents.reverse();
    parents
}

/// Remove whatever occupies `target` or blocks its parent directories
fn clear_conflict(destination: &Path, target: &Path) -> Result<(), StorageError> {
    for ancestor in parents_below(destination, target) {
        if let Ok(meta) = fs::symlink_metadata(ancestor) {
            if !meta.is_dir() {
                fs::remove_file(ancestor).map_err(|e| io_context(e, "remove", ancestor))?;
            }
        }
    }

    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.is_dir() {
            fs::remove_dir_all(target).map_err(|e| io_context(e, "remove", target))?;
        }
    }
    Ok(())
}

fn write_file(store: &FragmentStore, target: &Path, entry: &TreeEntry) -> Result<(), ApiError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_context(e, "create", parent))?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = target.with_file_name(format!(
        ".{}.quilt-tmp.{}",
        file_name,
        std::process::id()
    ));

    let result = write_temp(store, &temp_path, entry).and_then(|()| {
        fs::rename(&temp_path, target)
            .map_err(|e| ApiError::from(io_context(e, "rename", target)))
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;
    debug!(target = %target.display(), size = entry.size, "Wrote file");
    Ok(())
}

fn write_temp(store: &FragmentStore, temp_path: &Path, entry: &TreeEntry) -> Result<(), ApiError> {
    let mut file = File::create(temp_path).map_err(|e| io_context(e, "create", temp_path))?;
    for hash in &entry.fragments {
        let bytes = store.get(hash)?;
        file.write_all(&bytes)
            .map_err(|e| io_context(e, "write", temp_path))?;
    }
    file.sync_all().map_err(|e| io_context(e, "sync", temp_path))?;
    set_mode(temp_path, entry.mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
        .map_err(|e| io_context(e, "chmod", path))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), StorageError> {
    Ok(())
}

fn io_context(e: std::io::Error, action: &str, path: &Path) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        e.kind(),
        format!("Failed to {} {:?}: {}", action, path, e),
    ))
}
