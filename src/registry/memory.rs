//! In-memory registry
//!
//! A complete registry held in process memory. It enforces the same rules a
//! real registry does (hash verification, manifests only after their
//! fragments, immutable versions) and counts calls so transfer behavior can
//! be asserted.

use super::{BuildRecord, RegistryClient, TagEntry, VersionEntry};
use crate::error::{ApiError, RegistryError, StorageError};
use crate::session::Session;
use crate::tree::hasher;
use crate::tree::manifest::FragmentTree;
use crate::types::{hash_to_hex, Hash, PackageRef};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct PackageState {
    builds: Vec<BuildRecord>,
    versions: BTreeMap<String, Hash>,
    tags: BTreeMap<String, Hash>,
    access: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    fragments: HashMap<Hash, Vec<u8>>,
    manifests: HashMap<Hash, Vec<u8>>,
    packages: HashMap<PackageRef, PackageState>,
}

/// Snapshot of call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub existence_checks: usize,
    pub fragment_uploads: usize,
    pub fragment_downloads: usize,
    pub manifest_uploads: usize,
    pub manifest_downloads: usize,
}

#[derive(Default)]
struct Counters {
    existence_checks: AtomicUsize,
    fragment_uploads: AtomicUsize,
    fragment_downloads: AtomicUsize,
    manifest_uploads: AtomicUsize,
    manifest_downloads: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    counters: Counters,
    required_token: Option<String>,
    /// Fragment uploads allowed before every further upload fails
    upload_budget: Mutex<Option<usize>>,
    /// Delay applied to every existence check
    latency: Mutex<Option<Duration>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every call whose session does not carry `token`
    pub fn with_required_token(token: impl Into<String>) -> Self {
        Self {
            required_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn counts(&self) -> CallCounts {
        CallCounts {
            existence_checks: self.counters.existence_checks.load(Ordering::SeqCst),
            fragment_uploads: self.counters.fragment_uploads.load(Ordering::SeqCst),
            fragment_downloads: self.counters.fragment_downloads.load(Ordering::SeqCst),
            manifest_uploads: self.counters.manifest_uploads.load(Ordering::SeqCst),
            manifest_downloads: self.counters.manifest_downloads.load(Ordering::SeqCst),
        }
    }

    pub fn reset_counts(&self) {
        for counter in [
            &self.counters.existence_checks,
            &self.counters.fragment_uploads,
            &self.counters.fragment_downloads,
            &self.counters.manifest_uploads,
            &self.counters.manifest_downloads,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Simulate a connection that drops after `allowed` more fragment uploads
    pub fn fail_uploads_after(&self, allowed: Option<usize>) {
        *self.upload_budget.lock() = allowed;
    }

    /// Simulate a slow link: existence checks wait `latency` before answering
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Replace stored fragment bytes without re-hashing, as a damaged disk would
    pub fn corrupt_fragment(&self, hash: &Hash, bytes: Vec<u8>) {
        self.state.lock().fragments.insert(*hash, bytes);
    }

    pub fn has_fragment(&self, hash: &Hash) -> bool {
        self.state.lock().fragments.contains_key(hash)
    }

    pub fn fragment_count(&self) -> usize {
        self.state.lock().fragments.len()
    }

    fn authorize(&self, session: &Session) -> Result<(), RegistryError> {
        match &self.required_token {
            Some(required) if session.token.as_deref() != Some(required.as_str()) => Err(
                RegistryError::Unauthorized("a valid session token is required".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn not_found(package: &PackageRef, what: String) -> RegistryError {
        RegistryError::NotFound(format!("{}: {}", package, what))
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn fragments_exist(
        &self,
        session: &Session,
        _package: &PackageRef,
        hashes: &[Hash],
    ) -> Result<Vec<bool>, RegistryError> {
        self.authorize(session)?;
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.counters.existence_checks.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(hashes
            .iter()
            .map(|h| state.fragments.contains_key(h))
            .collect())
    }

    async fn upload_fragment(
        &self,
        session: &Session,
        _package: &PackageRef,
        hash: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        {
            let mut budget = self.upload_budget.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(RegistryError::Transport("connection reset".to_string()));
                }
                *remaining -= 1;
            }
        }
        self.counters.fragment_uploads.fetch_add(1, Ordering::SeqCst);

        let actual = hasher::compute_content_hash(&bytes);
        if actual != *hash {
            return Err(RegistryError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        self.state.lock().fragments.insert(*hash, bytes);
        Ok(())
    }

    async fn download_fragment(
        &self,
        session: &Session,
        package: &PackageRef,
        hash: &Hash,
    ) -> Result<Vec<u8>, RegistryError> {
        self.authorize(session)?;
        self.counters.fragment_downloads.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .fragments
            .get(hash)
            .cloned()
            .ok_or_else(|| Self::not_found(package, format!("fragment {}", hash_to_hex(hash))))
    }

    async fn upload_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        self.counters.manifest_uploads.fetch_add(1, Ordering::SeqCst);

        let tree = FragmentTree::from_bytes(root, &bytes).map_err(|e| match e {
            ApiError::StorageError(StorageError::StoreCorruption { expected, actual }) => {
                RegistryError::HashMismatch { expected, actual }
            }
            other => RegistryError::Protocol(other.to_string()),
        })?;

        let mut state = self.state.lock();
        if let Some(missing) = tree
            .fragment_hashes()
            .into_iter()
            .find(|h| !state.fragments.contains_key(h))
        {
            return Err(RegistryError::Conflict(format!(
                "manifest references missing fragment {}",
                hash_to_hex(&missing)
            )));
        }

        state.manifests.insert(*root, bytes);
        let pkg = state.packages.entry(package.clone()).or_default();
        if pkg.builds.last().map(|b| b.hash) != Some(*root) {
            pkg.builds.push(BuildRecord {
                hash: *root,
                created_at: Utc::now(),
                author: Some(package.owner.clone()),
            });
        }
        Ok(())
    }

    async fn download_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
    ) -> Result<Vec<u8>, RegistryError> {
        self.authorize(session)?;
        self.counters.manifest_downloads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let registered = state
            .packages
            .get(package)
            .map(|p| p.builds.iter().any(|b| b.hash == *root))
            .unwrap_or(false);
        if !registered {
            return Err(Self::not_found(package, format!("build {}", hash_to_hex(root))));
        }
        state
            .manifests
            .get(root)
            .cloned()
            .ok_or_else(|| Self::not_found(package, format!("manifest {}", hash_to_hex(root))))
    }

    async fn builds(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<BuildRecord>, RegistryError> {
        self.authorize(session)?;
        let state = self.state.lock();
        state
            .packages
            .get(package)
            .map(|p| p.builds.clone())
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))
    }

    async fn versions(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<VersionEntry>, RegistryError> {
        self.authorize(session)?;
        let state = self.state.lock();
        state
            .packages
            .get(package)
            .map(|p| {
                p.versions
                    .iter()
                    .map(|(version, hash)| VersionEntry {
                        version: version.clone(),
                        hash: *hash,
                    })
                    .collect()
            })
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))
    }

    async fn add_version(
        &self,
        session: &Session,
        package: &PackageRef,
        version: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        let mut state = self.state.lock();
        let pkg = state
            .packages
            .get_mut(package)
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))?;
        match pkg.versions.get(version) {
            Some(existing) if existing != hash => Err(RegistryError::Conflict(format!(
                "version {} already points to {}",
                version,
                hash_to_hex(existing)
            ))),
            Some(_) => Ok(()),
            None => {
                pkg.versions.insert(version.to_string(), *hash);
                Ok(())
            }
        }
    }

    async fn tags(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<TagEntry>, RegistryError> {
        self.authorize(session)?;
        let state = self.state.lock();
        state
            .packages
            .get(package)
            .map(|p| {
                p.tags
                    .iter()
                    .map(|(tag, hash)| TagEntry {
                        tag: tag.clone(),
                        hash: *hash,
                    })
                    .collect()
            })
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))
    }

    async fn add_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        let mut state = self.state.lock();
        let pkg = state
            .packages
            .get_mut(package)
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))?;
        pkg.tags.insert(tag.to_string(), *hash);
        Ok(())
    }

    async fn remove_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        let mut state = self.state.lock();
        let removed = state
            .packages
            .get_mut(package)
            .and_then(|p| p.tags.remove(tag));
        match removed {
            Some(_) => Ok(()),
            None => Err(Self::not_found(package, format!("tag {}", tag))),
        }
    }

    async fn access_list(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<String>, RegistryError> {
        self.authorize(session)?;
        let state = self.state.lock();
        let pkg = state
            .packages
            .get(package)
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))?;
        let mut users: BTreeSet<String> = pkg.access.clone();
        users.insert(package.owner.clone());
        Ok(users.into_iter().collect())
    }

    async fn access_add(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        let mut state = self.state.lock();
        let pkg = state
            .packages
            .get_mut(package)
            .ok_or_else(|| Self::not_found(package, "no such package".to_string()))?;
        pkg.access.insert(user.to_string());
        Ok(())
    }

    async fn access_remove(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError> {
        self.authorize(session)?;
        if user == package.owner {
            return Err(RegistryError::Conflict(
                "cannot revoke the owner's access".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let removed = state
            .packages
            .get_mut(package)
            .map(|p| p.access.remove(user))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Self::not_found(package, format!("user {}", user)))
        }
    }

    async fn list_packages(
        &self,
        session: &Session,
        owner: &str,
    ) -> Result<Vec<PackageRef>, RegistryError> {
        self.authorize(session)?;
        let state = self.state.lock();
        let mut packages: Vec<PackageRef> = state
            .packages
            .iter()
            .filter(|(pkg, p)| pkg.owner == owner && !p.builds.is_empty())
            .map(|(pkg, _)| pkg.clone())
            .collect();
        packages.sort();
        Ok(packages)
    }
}
