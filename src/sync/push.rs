//! Push: upload missing fragments, then the manifest
//!
//! The manifest goes up only after every fragment upload succeeded, so a
//! manifest visible on the registry never references missing data.

use super::{bounded, SyncOptions};
use crate::error::ApiError;
use crate::registry::RegistryClient;
use crate::session::Session;
use crate::store::FragmentStore;
use crate::tree::FragmentTree;
use crate::types::{short_hex, Hash, PackageRef};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub root_hash: Hash,
    /// Distinct fragments referenced by the tree
    pub fragments_total: usize,
    pub uploaded: usize,
    pub skipped: usize,
}

/// Push `tree` for `package`
///
/// With `reupload`, every fragment is sent regardless of what the registry
/// reports, which repairs a damaged or partial remote copy.
pub async fn push(
    client: &dyn RegistryClient,
    store: &FragmentStore,
    session: &Session,
    package: &PackageRef,
    tree: &FragmentTree,
    reupload: bool,
    options: &SyncOptions,
) -> Result<PushReport, ApiError> {
    let manifest = tree.canonical_bytes()?;
    let root_hash = crate::tree::hasher::compute_content_hash(&manifest);
    let hashes: Vec<Hash> = tree.fragment_hashes().into_iter().collect();

    let missing = if reupload {
        hashes.clone()
    } else {
        missing_remotely(client, session, package, &hashes, options).await?
    };
    debug!(
        package = %package,
        total = hashes.len(),
        missing = missing.len(),
        "Fragment delta computed"
    );

    stream::iter(missing.iter().map(|hash| async move {
        let bytes = store.get(hash)?;
        bounded(
            options.timeout,
            client.upload_fragment(session, package, hash, bytes),
        )
        .await?;
        debug!(hash = %short_hex(hash), "Uploaded fragment");
        Ok::<(), ApiError>(())
    }))
    .buffer_unordered(options.concurrency.max(1))
    .try_collect::<Vec<()>>()
    .await?;

    bounded(
        options.timeout,
        client.upload_manifest(session, package, &root_hash, manifest),
    )
    .await?;

    let report = PushReport {
        root_hash,
        fragments_total: hashes.len(),
        uploaded: missing.len(),
        skipped: hashes.len() - missing.len(),
    };
    info!(
        package = %package,
        root = %short_hex(&root_hash),
        uploaded = report.uploaded,
        skipped = report.skipped,
        "Pushed package"
    );
    Ok(report)
}

/// Hashes the registry does not have, preserving input order
async fn missing_remotely(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    hashes: &[Hash],
    options: &SyncOptions,
) -> Result<Vec<Hash>, ApiError> {
    let mut missing = Vec::new();
    for batch in hashes.chunks(options.batch_size.max(1)) {
        let exists = bounded(
            options.timeout,
            client.fragments_exist(session, package, batch),
        )
        .await?;
        missing.extend(
            batch
                .iter()
                .zip(exists)
                .filter(|(_, present)| !present)
                .map(|(hash, _)| *hash),
        );
    }
    Ok(missing)
}
