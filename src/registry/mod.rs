//! Registry client abstraction
//!
//! The remote registry is consumed through a request/response API. Every
//! call is scoped to a package and carries the caller's `Session`.

use crate::error::RegistryError;
use crate::session::Session;
use crate::types::{hex_hash, Hash, PackageRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod http;
pub mod memory;

pub use http::HttpRegistryClient;
pub use memory::MemoryRegistry;

/// One pushed build in a package's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    #[serde(with = "hex_hash")]
    pub hash: Hash,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(with = "hex_hash")]
    pub hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub tag: String,
    #[serde(with = "hex_hash")]
    pub hash: Hash,
}

/// Registry client trait
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Batch existence check; the result is parallel to `hashes`
    async fn fragments_exist(
        &self,
        session: &Session,
        package: &PackageRef,
        hashes: &[Hash],
    ) -> Result<Vec<bool>, RegistryError>;

    /// Upload fragment bytes. Idempotent.
    async fn upload_fragment(
        &self,
        session: &Session,
        package: &PackageRef,
        hash: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError>;

    async fn download_fragment(
        &self,
        session: &Session,
        package: &PackageRef,
        hash: &Hash,
    ) -> Result<Vec<u8>, RegistryError>;

    /// Upload a manifest and register it as the package's latest build
    async fn upload_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError>;

    async fn download_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
    ) -> Result<Vec<u8>, RegistryError>;

    /// Build history, oldest first
    async fn builds(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<BuildRecord>, RegistryError>;

    async fn versions(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<VersionEntry>, RegistryError>;

    async fn add_version(
        &self,
        session: &Session,
        package: &PackageRef,
        version: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError>;

    async fn tags(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<TagEntry>, RegistryError>;

    async fn add_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError>;

    async fn remove_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
    ) -> Result<(), RegistryError>;

    async fn access_list(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<String>, RegistryError>;

    async fn access_add(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError>;

    async fn access_remove(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError>;

    /// Packages published under `owner`, sorted by name
    async fn list_packages(
        &self,
        session: &Session,
        owner: &str,
    ) -> Result<Vec<PackageRef>, RegistryError>;
}
