//! Integration tests for selector resolution and named pointers

use crate::integration::test_utils::{package, write_files, Client};
use quilt::error::{ApiError, ErrorClass, RegistryError};
use quilt::registry::MemoryRegistry;
use quilt::resolve::Selector;
use quilt::types::{Hash, PackageRef};
use std::sync::Arc;
use tempfile::TempDir;

/// Push two distinct builds of the same package
async fn two_builds(client: &Client, pkg: &PackageRef) -> (Hash, Hash) {
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("data.csv", "1\n")]);
    let first = client.api.build(pkg, src.path()).unwrap().root_hash;
    client.api.push(pkg, false).await.unwrap();

    write_files(src.path(), &[("data.csv", "1\n2\n")]);
    let second = client.api.build(pkg, src.path()).unwrap().root_hash;
    client.api.push(pkg, false).await.unwrap();
    (first, second)
}

/// Hash, version and tag selectors each resolve to the build they name
#[tokio::test]
async fn test_selector_kinds() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/weather");
    let (first, second) = two_builds(&client, &pkg).await;

    client.api.version_add(&pkg, "1.0.0", &first).await.unwrap();
    client.api.tag_add(&pkg, "latest", &second).await.unwrap();

    assert_eq!(client.api.resolve(&pkg, &Selector::Hash(first)).await.unwrap(), first);
    assert_eq!(
        client
            .api
            .resolve(&pkg, &Selector::Version("1.0.0".to_string()))
            .await
            .unwrap(),
        first
    );
    assert_eq!(client.api.resolve(&pkg, &Selector::default()).await.unwrap(), second);
}

/// Without an explicit selector, a package with no `latest` tag is an
/// unknown tag, not some arbitrary build
#[tokio::test]
async fn test_default_requires_latest_tag() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/untagged");
    two_builds(&client, &pkg).await;

    match client.api.resolve(&pkg, &Selector::default()).await {
        Err(ApiError::UnknownTag { tag, .. }) => assert_eq!(tag, "latest"),
        other => panic!("expected UnknownTag, got {:?}", other),
    }
}

/// A package the registry has never seen reports the missing pointer, not a
/// transport-level not-found
#[tokio::test]
async fn test_unknown_package_reports_missing_pointer() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/never-pushed");

    match client.api.resolve(&pkg, &Selector::default()).await {
        Err(ApiError::UnknownTag { tag, .. }) => assert_eq!(tag, "latest"),
        other => panic!("expected UnknownTag, got {:?}", other),
    }
    assert!(matches!(
        client
            .api
            .resolve(&pkg, &Selector::Version("1.0".to_string()))
            .await,
        Err(ApiError::UnknownVersion { .. })
    ));
    assert!(client.api.tag_list(&pkg).await.unwrap().is_empty());
    assert!(client.api.version_list(&pkg).await.unwrap().is_empty());
}

/// Versions never move once set
#[tokio::test]
async fn test_versions_are_immutable() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/stable");
    let (first, second) = two_builds(&client, &pkg).await;

    client.api.version_add(&pkg, "1.0.0", &first).await.unwrap();
    client.api.version_add(&pkg, "1.0.0", &first).await.unwrap();
    let err = client.api.version_add(&pkg, "1.0.0", &second).await.unwrap_err();
    match &err {
        ApiError::VersionExists { existing, .. } => assert_eq!(existing, &first),
        other => panic!("expected VersionExists, got {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Consistency);

    let versions = client.api.version_list(&pkg).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].hash, first);
}

/// Tags move freely and can be removed
#[tokio::test]
async fn test_tags_move_and_remove() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/moving");
    let (first, second) = two_builds(&client, &pkg).await;

    client.api.tag_add(&pkg, "latest", &first).await.unwrap();
    client.api.tag_add(&pkg, "latest", &second).await.unwrap();
    client.api.tag_add(&pkg, "archive", &first).await.unwrap();
    let tags = client.api.tag_list(&pkg).await.unwrap();
    let names: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(names, vec!["archive", "latest"]);
    assert_eq!(tags[1].hash, second);

    client.api.tag_remove(&pkg, "latest").await.unwrap();
    assert!(matches!(
        client.api.resolve(&pkg, &Selector::default()).await,
        Err(ApiError::UnknownTag { .. })
    ));
    assert!(matches!(
        client.api.tag_remove(&pkg, "latest").await,
        Err(ApiError::UnknownTag { .. })
    ));
}

/// Pointers can only name builds the registry knows about
#[tokio::test]
async fn test_pointers_require_known_build() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/pointers");
    two_builds(&client, &pkg).await;
    let stranger = [0x42u8; 32];

    assert!(matches!(
        client.api.version_add(&pkg, "2.0", &stranger).await,
        Err(ApiError::UnknownHash { .. })
    ));
    assert!(matches!(
        client.api.tag_add(&pkg, "latest", &stranger).await,
        Err(ApiError::UnknownHash { .. })
    ));
    assert!(matches!(
        client
            .api
            .resolve(&pkg, &Selector::Version("9.9".to_string()))
            .await,
        Err(ApiError::UnknownVersion { .. })
    ));
}

/// Malformed pointer names are rejected before any registry call
#[tokio::test]
async fn test_invalid_pointer_names() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/names");
    let (first, _) = two_builds(&client, &pkg).await;

    assert!(matches!(
        client.api.version_add(&pkg, "", &first).await,
        Err(ApiError::InvalidVersion(_))
    ));
    assert!(matches!(
        client.api.tag_add(&pkg, "has space", &first).await,
        Err(ApiError::InvalidTag(_))
    ));
}

/// The log lists every pushed build, oldest first
#[tokio::test]
async fn test_log_lists_history() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/history");
    let (first, second) = two_builds(&client, &pkg).await;

    let log = client.api.log(&pkg).await.unwrap();
    let hashes: Vec<Hash> = log.iter().map(|b| b.hash).collect();
    assert_eq!(hashes, vec![first, second]);
    assert_eq!(log[0].author.as_deref(), Some("alice"));
}

/// Access control: the owner always has access and cannot be removed
#[tokio::test]
async fn test_access_management() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/shared");
    two_builds(&client, &pkg).await;

    client.api.access_add(&pkg, "bob").await.unwrap();
    client.api.access_add(&pkg, "public").await.unwrap();
    assert_eq!(
        client.api.access_list(&pkg).await.unwrap(),
        vec!["alice", "bob", "public"]
    );

    client.api.access_remove(&pkg, "bob").await.unwrap();
    assert_eq!(client.api.access_list(&pkg).await.unwrap(), vec!["alice", "public"]);
    assert!(matches!(
        client.api.access_remove(&pkg, "alice").await,
        Err(ApiError::RegistryError(RegistryError::Conflict(_)))
    ));
}

/// Remote listing shows only the owner's pushed packages
#[tokio::test]
async fn test_list_remote_packages() {
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    two_builds(&client, &package("alice/zeta")).await;
    two_builds(&client, &package("alice/alpha")).await;
    two_builds(&client, &package("bob/other")).await;

    let packages = client.api.list_remote("alice").await.unwrap();
    let names: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
    assert_eq!(names, vec!["alice/alpha", "alice/zeta"]);
}
