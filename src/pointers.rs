//! Version, tag, log, and access operations
//!
//! Versions are append-only: once a version names a hash it never names
//! another. Tags move freely. Both may only point at builds the registry
//! already knows.

use crate::error::ApiError;
use crate::registry::{BuildRecord, RegistryClient, TagEntry, VersionEntry};
use crate::resolve::{ensure_known_build, or_empty};
use crate::session::Session;
use crate::types::{short_hex, Hash, PackageRef};
use tracing::info;

pub fn validate_version(version: &str) -> Result<(), ApiError> {
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        return Err(ApiError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

pub fn validate_tag(tag: &str) -> Result<(), ApiError> {
    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(ApiError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Point `version` at `hash`
///
/// Re-adding the same mapping succeeds without touching the registry.
pub async fn version_add(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    version: &str,
    hash: &Hash,
) -> Result<(), ApiError> {
    validate_version(version)?;
    ensure_known_build(client, session, package, hash).await?;

    let existing = or_empty(client.versions(session, package).await)?
        .into_iter()
        .find(|v| v.version == version);
    match existing {
        Some(entry) if entry.hash == *hash => Ok(()),
        Some(entry) => Err(ApiError::VersionExists {
            package: package.clone(),
            version: version.to_string(),
            existing: entry.hash,
        }),
        None => {
            client.add_version(session, package, version, hash).await?;
            info!(package = %package, version, hash = %short_hex(hash), "Version added");
            Ok(())
        }
    }
}

pub async fn version_list(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
) -> Result<Vec<VersionEntry>, ApiError> {
    let mut versions = or_empty(client.versions(session, package).await)?;
    versions.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(versions)
}

/// Point `tag` at `hash`, replacing any previous target
pub async fn tag_add(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    tag: &str,
    hash: &Hash,
) -> Result<(), ApiError> {
    validate_tag(tag)?;
    ensure_known_build(client, session, package, hash).await?;
    client.add_tag(session, package, tag, hash).await?;
    info!(package = %package, tag, hash = %short_hex(hash), "Tag set");
    Ok(())
}

pub async fn tag_remove(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    tag: &str,
) -> Result<(), ApiError> {
    validate_tag(tag)?;
    let present = or_empty(client.tags(session, package).await)?
        .iter()
        .any(|t| t.tag == tag);
    if !present {
        return Err(ApiError::UnknownTag {
            package: package.clone(),
            tag: tag.to_string(),
        });
    }
    client.remove_tag(session, package, tag).await?;
    info!(package = %package, tag, "Tag removed");
    Ok(())
}

pub async fn tag_list(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
) -> Result<Vec<TagEntry>, ApiError> {
    let mut tags = or_empty(client.tags(session, package).await)?;
    tags.sort_by(|a, b| a.tag.cmp(&b.tag));
    Ok(tags)
}

/// Build history, oldest first
pub async fn log(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
) -> Result<Vec<BuildRecord>, ApiError> {
    let mut builds = client.builds(session, package).await?;
    builds.sort_by_key(|b| b.created_at);
    Ok(builds)
}

pub async fn access_add(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    user: &str,
) -> Result<(), ApiError> {
    client.access_add(session, package, user).await?;
    Ok(())
}

pub async fn access_remove(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
    user: &str,
) -> Result<(), ApiError> {
    client.access_remove(session, package, user).await?;
    Ok(())
}

pub async fn access_list(
    client: &dyn RegistryClient,
    session: &Session,
    package: &PackageRef,
) -> Result<Vec<String>, ApiError> {
    let mut users = client.access_list(session, package).await?;
    users.sort();
    Ok(users)
}
