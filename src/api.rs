//! Package API
//!
//! One handle over the local store, the local package index, and a registry
//! client. The CLI drives everything through it; tests build it over a
//! `MemoryRegistry`.

use crate::buildfile;
use crate::config::QuiltConfig;
use crate::error::ApiError;
use crate::pointers;
use crate::registry::{BuildRecord, HttpRegistryClient, RegistryClient, TagEntry, VersionEntry};
use crate::resolve::{self, Selector};
use crate::session::Session;
use crate::store::{FragmentStore, LocalBuild, PackageIndex, SledPackageIndex};
use crate::sync::{self, InstallReport, PushReport, SyncOptions};
use crate::tree::{BuildOutput, BuildRequest, FragmentTree, PackageBuilder};
use crate::types::{Hash, PackageRef};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct PackageApi {
    store: Arc<FragmentStore>,
    index: Arc<dyn PackageIndex>,
    registry: Arc<dyn RegistryClient>,
    session: Session,
    config: QuiltConfig,
}

impl PackageApi {
    pub fn new(
        store: Arc<FragmentStore>,
        index: Arc<dyn PackageIndex>,
        registry: Arc<dyn RegistryClient>,
        session: Session,
        config: QuiltConfig,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            session,
            config,
        }
    }

    /// Open the configured store and index and talk HTTP to the configured
    /// registry
    pub fn open(config: QuiltConfig) -> Result<Self, ApiError> {
        let store = Arc::new(FragmentStore::new(config.storage.fragments_path())?);
        let index = Arc::new(SledPackageIndex::new(config.storage.index_path())?);
        let registry = Arc::new(HttpRegistryClient::new(config.registry.timeout_secs)?);
        let session = Session::from_config(&config);
        debug!(
            registry = %session.registry_url,
            authenticated = session.is_authenticated(),
            "Opened package API"
        );
        Ok(Self::new(store, index, registry, session, config))
    }

    pub fn store(&self) -> &Arc<FragmentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &QuiltConfig {
        &self.config
    }

    fn sync_options(&self) -> SyncOptions {
        self.config.registry.sync_options()
    }

    fn builder(&self) -> PackageBuilder {
        PackageBuilder::with_options(
            Arc::clone(&self.store),
            self.config.build.chunk_size,
            self.config.build.walker_config(),
        )
    }

    /// Build `source` (a directory or build file) and record it as the
    /// package's latest local build
    pub fn build(&self, package: &PackageRef, source: &Path) -> Result<BuildOutput, ApiError> {
        let output = self.builder().build_path(source)?;
        self.record(package, &output, source)?;
        Ok(output)
    }

    pub fn build_request(
        &self,
        package: &PackageRef,
        request: &BuildRequest,
    ) -> Result<BuildOutput, ApiError> {
        let output = self.builder().build(request)?;
        let source = request
            .directory
            .as_deref()
            .or(request.build_file.as_deref())
            .unwrap_or_else(|| Path::new(""));
        self.record(package, &output, source)?;
        Ok(output)
    }

    fn record(
        &self,
        package: &PackageRef,
        output: &BuildOutput,
        source: &Path,
    ) -> Result<(), ApiError> {
        self.index.record_build(&LocalBuild {
            package: package.clone(),
            root_hash: output.root_hash,
            built_at: Utc::now(),
            source: source.display().to_string(),
        })?;
        info!(package = %package, source = %source.display(), "Recorded local build");
        Ok(())
    }

    /// Write a build file describing every file under `directory`
    pub fn generate(&self, directory: &Path) -> Result<PathBuf, ApiError> {
        buildfile::generate(directory, self.config.build.walker_config())
    }

    pub fn local_builds(&self) -> Result<Vec<LocalBuild>, ApiError> {
        Ok(self.index.list()?)
    }

    pub fn remove_local(&self, package: &PackageRef) -> Result<(), ApiError> {
        if !self.index.remove(package)? {
            return Err(ApiError::NoLocalBuild(package.clone()));
        }
        Ok(())
    }

    /// Latest local build and its verified manifest
    pub fn inspect(&self, package: &PackageRef) -> Result<(LocalBuild, FragmentTree), ApiError> {
        let build = self
            .index
            .latest_build(package)?
            .ok_or_else(|| ApiError::NoLocalBuild(package.clone()))?;
        let bytes = self.store.get(&build.root_hash)?;
        let tree = FragmentTree::from_bytes(&build.root_hash, &bytes)?;
        Ok((build, tree))
    }

    /// Push the latest local build of `package`
    pub async fn push(&self, package: &PackageRef, reupload: bool) -> Result<PushReport, ApiError> {
        let (_, tree) = self.inspect(package)?;
        self.push_tree(package, &tree, reupload).await
    }

    pub async fn push_tree(
        &self,
        package: &PackageRef,
        tree: &FragmentTree,
        reupload: bool,
    ) -> Result<PushReport, ApiError> {
        sync::push(
            self.registry.as_ref(),
            &self.store,
            &self.session,
            package,
            tree,
            reupload,
            &self.sync_options(),
        )
        .await
    }

    /// Install into `destination`, or `{install.root}/{owner}/{name}`
    pub async fn install(
        &self,
        package: &PackageRef,
        selector: &Selector,
        destination: Option<&Path>,
        force: bool,
    ) -> Result<InstallReport, ApiError> {
        let destination = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.install.destination_for(package));
        sync::install(
            self.registry.as_ref(),
            &self.store,
            &self.session,
            package,
            selector,
            &destination,
            force,
            &self.sync_options(),
        )
        .await
    }

    pub async fn resolve(&self, package: &PackageRef, selector: &Selector) -> Result<Hash, ApiError> {
        resolve::resolve(self.registry.as_ref(), &self.session, package, selector).await
    }

    pub async fn version_add(
        &self,
        package: &PackageRef,
        version: &str,
        hash: &Hash,
    ) -> Result<(), ApiError> {
        pointers::version_add(self.registry.as_ref(), &self.session, package, version, hash).await
    }

    pub async fn version_list(&self, package: &PackageRef) -> Result<Vec<VersionEntry>, ApiError> {
        pointers::version_list(self.registry.as_ref(), &self.session, package).await
    }

    pub async fn tag_add(&self, package: &PackageRef, tag: &str, hash: &Hash) -> Result<(), ApiError> {
        pointers::tag_add(self.registry.as_ref(), &self.session, package, tag, hash).await
    }

    pub async fn tag_remove(&self, package: &PackageRef, tag: &str) -> Result<(), ApiError> {
        pointers::tag_remove(self.registry.as_ref(), &self.session, package, tag).await
    }

    pub async fn tag_list(&self, package: &PackageRef) -> Result<Vec<TagEntry>, ApiError> {
        pointers::tag_list(self.registry.as_ref(), &self.session, package).await
    }

    pub async fn log(&self, package: &PackageRef) -> Result<Vec<BuildRecord>, ApiError> {
        pointers::log(self.registry.as_ref(), &self.session, package).await
    }

    pub async fn access_add(&self, package: &PackageRef, user: &str) -> Result<(), ApiError> {
        pointers::access_add(self.registry.as_ref(), &self.session, package, user).await
    }

    pub async fn access_remove(&self, package: &PackageRef, user: &str) -> Result<(), ApiError> {
        pointers::access_remove(self.registry.as_ref(), &self.session, package, user).await
    }

    pub async fn access_list(&self, package: &PackageRef) -> Result<Vec<String>, ApiError> {
        pointers::access_list(self.registry.as_ref(), &self.session, package).await
    }

    /// Packages published under `owner` on the registry
    pub async fn list_remote(&self, owner: &str) -> Result<Vec<PackageRef>, ApiError> {
        Ok(self.registry.list_packages(&self.session, owner).await?)
    }
}
