//! Selector resolution
//!
//! Maps a hash, version, or tag selector to a root hash known to the
//! registry for one package.

use crate::error::{ApiError, RegistryError};
use crate::registry::RegistryClient;
use crate::session::Session;
use crate::types::{parse_hash, short_hex, Hash, PackageRef};
use std::fmt;
use tracing::debug;

/// Tag used when no selector is given
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Hash(Hash),
    Version(String),
    Tag(String),
}

impl Selector {
    /// Build a selector from the mutually exclusive CLI options
    pub fn from_options(
        hash: Option<&str>,
        version: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Self, ApiError> {
        match (hash, version, tag) {
            (None, None, None) => Ok(Selector::Tag(DEFAULT_TAG.to_string())),
            (Some(hash), None, None) => Ok(Selector::Hash(parse_hash(hash)?)),
            (None, Some(version), None) => Ok(Selector::Version(version.to_string())),
            (None, None, Some(tag)) => Ok(Selector::Tag(tag.to_string())),
            _ => Err(ApiError::AmbiguousSelector),
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Selector::Tag(DEFAULT_TAG.to_string())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Hash(hash) => write!(f, "hash {}", short_hex(hash)),
            Selector::Version(version) => write!(f, "version {}", version),
            Selector::Tag(tag) => write!(f, "tag {}", tag),
        }
    }
}

/// Resolve `selector` to a root hash for `package`
pub async fn resolve(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    selector: &Selector,
) -> Result<Hash, ApiError> {
    debug!(package = %package, selector = %selector, "Resolving selector");
    match selector {
        Selector::Hash(hash) => {
            ensure_known_build(client, session, package, hash).await?;
            Ok(*hash)
        }
        Selector::Version(version) => or_empty(client.versions(session, package).await)?
            .into_iter()
            .find(|v| &v.version == version)
            .map(|v| v.hash)
            .ok_or_else(|| ApiError::UnknownVersion {
                package: package.clone(),
                version: version.clone(),
            }),
        Selector::Tag(tag) => or_empty(client.tags(session, package).await)?
            .into_iter()
            .find(|t| &t.tag == tag)
            .map(|t| t.hash)
            .ok_or_else(|| ApiError::UnknownTag {
                package: package.clone(),
                tag: tag.clone(),
            }),
    }
}

/// Fail with `UnknownHash` unless `hash` is in the package's build history
pub(crate) async fn ensure_known_build(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    hash: &Hash,
) -> Result<(), ApiError> {
    let builds = or_empty(client.builds(session, package).await)?;
    if builds.iter().any(|b| &b.hash == hash) {
        Ok(())
    } else {
        Err(ApiError::UnknownHash {
            package: package.clone(),
            hash: *hash,
        })
    }
}

/// A package the registry has never seen has no builds, versions or tags
pub(crate) fn or_empty<T>(listing: Result<Vec<T>, RegistryError>) -> Result<Vec<T>, ApiError> {
    match listing {
        Ok(items) => Ok(items),
        Err(RegistryError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
