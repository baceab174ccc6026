//! Integration tests for the push protocol

use crate::integration::test_utils::{package, write_files, Client};
use quilt::error::{ApiError, ErrorClass, RegistryError};
use quilt::registry::{MemoryRegistry, RegistryClient};
use quilt::resolve::Selector;
use quilt::sync::{self, SyncOptions};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Pushing twice uploads nothing the second time but still registers the
/// manifest
#[tokio::test]
async fn test_second_push_uploads_nothing() {
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a.txt", "x"), ("b/c.txt", "y"), ("b/d.txt", "z")]);
    let client = Client::new(Arc::new(MemoryRegistry::new()));
    let pkg = package("alice/weather");
    client.api.build(&pkg, src.path()).unwrap();

    let first = client.api.push(&pkg, false).await.unwrap();
    assert_eq!(first.fragments_total, 3);
    assert_eq!(first.uploaded, 3);

    let second = client.api.push(&pkg, false).await.unwrap();
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.root_hash, first.root_hash);

    let counts = client.registry.counts();
    assert_eq!(counts.fragment_uploads, 3);
    assert_eq!(counts.manifest_uploads, 2);
}

/// Fragments already pushed by another package are not uploaded again
#[tokio::test]
async fn test_cross_package_dedup() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("shared.csv", "1,2,3\n")]);

    client.api.build(&package("alice/one"), src.path()).unwrap();
    client.api.push(&package("alice/one"), false).await.unwrap();

    write_files(src.path(), &[("extra.csv", "4,5,6\n")]);
    client.api.build(&package("alice/two"), src.path()).unwrap();
    let report = client.api.push(&package("alice/two"), false).await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 1);
}

/// An interrupted push never exposes the manifest; re-running it completes
/// the upload without sending finished fragments again
#[tokio::test]
async fn test_interrupted_push_is_resumable() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::with_config(registry.clone(), {
        let mut config = quilt::config::QuiltConfig::default();
        config.registry.concurrency = 1;
        config
    });
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
    let pkg = package("alice/flaky");
    let built = client.api.build(&pkg, src.path()).unwrap();

    registry.fail_uploads_after(Some(2));
    let err = client.api.push(&pkg, false).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
    assert!(err.is_retryable());
    assert_eq!(registry.counts().manifest_uploads, 0);
    assert_eq!(registry.fragment_count(), 2);
    assert!(matches!(
        client
            .api
            .resolve(&pkg, &Selector::Hash(built.root_hash))
            .await,
        Err(ApiError::UnknownHash { .. })
    ));

    registry.fail_uploads_after(None);
    registry.reset_counts();
    let report = client.api.push(&pkg, false).await.unwrap();
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(registry.counts().manifest_uploads, 1);
}

/// Re-upload sends every fragment and repairs damaged remote data
#[tokio::test]
async fn test_reupload_repairs_remote() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a.txt", "x"), ("b.txt", "y")]);
    let pkg = package("alice/repair");
    let built = client.api.build(&pkg, src.path()).unwrap();
    client.api.push(&pkg, false).await.unwrap();

    let damaged = built.tree.entries["a.txt"].fragments[0];
    registry.corrupt_fragment(&damaged, b"garbage".to_vec());
    registry.reset_counts();

    let report = client.api.push(&pkg, true).await.unwrap();
    assert_eq!(report.uploaded, 2);
    let counts = registry.counts();
    assert_eq!(counts.fragment_uploads, 2);
    assert_eq!(counts.manifest_uploads, 1);
    assert_eq!(counts.existence_checks, 0);

    let session = client.api.session();
    let bytes = registry
        .download_fragment(session, &pkg, &damaged)
        .await
        .unwrap();
    assert_eq!(bytes, b"x");
}

/// The registry rejects fragments whose bytes do not match their hash
#[tokio::test]
async fn test_remote_hash_mismatch_rejected() {
    let registry = MemoryRegistry::new();
    let session = quilt::session::Session::anonymous("memory://");
    let pkg = package("alice/bad");
    let claimed = [9u8; 32];
    let err = registry
        .upload_fragment(&session, &pkg, &claimed, b"not that".to_vec())
        .await
        .unwrap_err();
    match err {
        RegistryError::HashMismatch { expected, .. } => assert_eq!(expected, claimed),
        other => panic!("expected HashMismatch, got {:?}", other),
    }
    assert!(!registry.has_fragment(&claimed));
}

/// Existence checks are sent in batches of the configured size
#[tokio::test]
async fn test_existence_checks_are_batched() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..7)
        .map(|i| (format!("f{}.txt", i), format!("content {}", i)))
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    write_files(src.path(), &borrowed);
    let built = client.api.build(&package("alice/batch"), src.path()).unwrap();

    let options = SyncOptions {
        batch_size: 3,
        ..SyncOptions::default()
    };
    sync::push(
        registry.as_ref(),
        client.api.store(),
        client.api.session(),
        &package("alice/batch"),
        &built.tree,
        false,
        &options,
    )
    .await
    .unwrap();
    assert_eq!(registry.counts().existence_checks, 3);
    assert_eq!(registry.counts().fragment_uploads, 7);
}

/// A registry call that exceeds the timeout fails as a retryable error
#[tokio::test]
async fn test_slow_registry_times_out() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a.txt", "x")]);
    let built = client.api.build(&package("alice/slow"), src.path()).unwrap();

    registry.set_latency(Some(Duration::from_secs(5)));
    let options = SyncOptions {
        timeout: Duration::from_millis(50),
        ..SyncOptions::default()
    };
    let err = sync::push(
        registry.as_ref(),
        client.api.store(),
        client.api.session(),
        &package("alice/slow"),
        &built.tree,
        false,
        &options,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ApiError::RegistryError(RegistryError::Timeout(_))
    ));
    assert!(err.is_retryable());
    assert_eq!(registry.counts().manifest_uploads, 0);
}

/// A registry that requires a token rejects anonymous pushes as input
/// errors
#[tokio::test]
async fn test_unauthorized_push() {
    let registry = Arc::new(MemoryRegistry::with_required_token("secret"));
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a.txt", "x")]);
    client.api.build(&package("alice/private"), src.path()).unwrap();

    let err = client
        .api
        .push(&package("alice/private"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::RegistryError(RegistryError::Unauthorized(_))
    ));
    assert_eq!(err.class(), ErrorClass::Input);
}
