//! Integration tests for installing packages

use crate::integration::test_utils::{package, write_files, Client};
use quilt::error::{ApiError, ErrorClass, RegistryError};
use quilt::registry::{MemoryRegistry, RegistryClient};
use quilt::resolve::Selector;
use quilt::session::Session;
use quilt::tree::hasher::compute_content_hash;
use quilt::tree::manifest::META_CHUNK_SIZE;
use quilt::tree::{FragmentTree, TreeEntry};
use quilt::types::Hash;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Build and push a package on one client; return the root hash
async fn publish(client: &Client, name: &str, files: &[(&str, &str)]) -> Hash {
    let src = TempDir::new().unwrap();
    write_files(src.path(), files);
    let pkg = package(name);
    let built = client.api.build(&pkg, src.path()).unwrap();
    client.api.push(&pkg, false).await.unwrap();
    built.root_hash
}

/// Installing on a fresh machine downloads every fragment once and
/// reproduces the files
#[tokio::test]
async fn test_install_on_fresh_client() {
    let registry = Arc::new(MemoryRegistry::new());
    let publisher = Client::new(registry.clone());
    let root = publish(
        &publisher,
        "alice/weather",
        &[("a.txt", "x"), ("nested/b.txt", "y"), ("nested/copy.txt", "y")],
    )
    .await;

    let consumer = Client::new(registry.clone());
    let dest = TempDir::new().unwrap();
    registry.reset_counts();
    let report = consumer
        .api
        .install(
            &package("alice/weather"),
            &Selector::Hash(root),
            Some(dest.path()),
            false,
        )
        .await
        .unwrap();

    assert_eq!(report.root_hash, root);
    assert_eq!(report.files_written, 3);
    assert_eq!(report.downloaded, 2);
    assert_eq!(registry.counts().fragment_downloads, 2);
    assert_eq!(registry.counts().manifest_downloads, 1);
    assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "x");
    assert_eq!(
        fs::read_to_string(dest.path().join("nested").join("copy.txt")).unwrap(),
        "y"
    );
}

/// Installing on the machine that built the package downloads nothing
#[tokio::test]
async fn test_install_reuses_local_fragments() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let root = publish(&client, "alice/local", &[("a.txt", "x"), ("b.txt", "y")]).await;

    let dest = TempDir::new().unwrap();
    registry.reset_counts();
    let report = client
        .api
        .install(&package("alice/local"), &Selector::Hash(root), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 0);
    assert_eq!(report.reused, 2);
    assert_eq!(registry.counts().fragment_downloads, 0);
    assert_eq!(registry.counts().manifest_downloads, 0);
}

/// A second install into the same place rewrites nothing
#[tokio::test]
async fn test_reinstall_is_noop() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let root = publish(&client, "alice/again", &[("a.txt", "x"), ("d/e.txt", "")]).await;
    let dest = TempDir::new().unwrap();
    let pkg = package("alice/again");

    client
        .api
        .install(&pkg, &Selector::Hash(root), Some(dest.path()), false)
        .await
        .unwrap();
    let report = client
        .api
        .install(&pkg, &Selector::Hash(root), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(report.files_written, 0);
    assert_eq!(report.files_unchanged, 2);
}

/// A differing file blocks the install and nothing is written
#[tokio::test]
async fn test_conflict_leaves_destination_untouched() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let root = publish(&client, "alice/conflict", &[("a.txt", "x"), ("b.txt", "y")]).await;
    let dest = TempDir::new().unwrap();
    fs::write(dest.path().join("b.txt"), "local edits").unwrap();

    let err = client
        .api
        .install(
            &package("alice/conflict"),
            &Selector::Hash(root),
            Some(dest.path()),
            false,
        )
        .await
        .unwrap_err();
    match &err {
        ApiError::WouldOverwrite(path) => assert_eq!(path, &dest.path().join("b.txt")),
        other => panic!("expected WouldOverwrite, got {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Input);
    assert!(!dest.path().join("a.txt").exists());
    assert_eq!(
        fs::read_to_string(dest.path().join("b.txt")).unwrap(),
        "local edits"
    );
}

/// Force replaces conflicting files and directories
#[tokio::test]
async fn test_force_overwrites() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let root = publish(&client, "alice/force", &[("a.txt", "x"), ("dir/b.txt", "y")]).await;
    let dest = TempDir::new().unwrap();
    fs::create_dir_all(dest.path().join("a.txt").join("inner")).unwrap();
    fs::write(dest.path().join("dir"), "a file where a directory goes").unwrap();

    let report = client
        .api
        .install(
            &package("alice/force"),
            &Selector::Hash(root),
            Some(dest.path()),
            true,
        )
        .await
        .unwrap();
    assert_eq!(report.files_written, 2);
    assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "x");
    assert_eq!(
        fs::read_to_string(dest.path().join("dir").join("b.txt")).unwrap(),
        "y"
    );
}

/// Unrelated files in the destination are left alone
#[tokio::test]
async fn test_unrelated_files_kept() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let root = publish(&client, "alice/extra", &[("a.txt", "x")]).await;
    let dest = TempDir::new().unwrap();
    fs::write(dest.path().join("notes.md"), "mine").unwrap();

    client
        .api
        .install(&package("alice/extra"), &Selector::Hash(root), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(dest.path().join("notes.md")).unwrap(), "mine");
}

/// Corrupt remote bytes are detected before anything is written
#[tokio::test]
async fn test_corrupt_remote_fragment_detected() {
    let registry = Arc::new(MemoryRegistry::new());
    let publisher = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("a.txt", "x")]);
    let pkg = package("alice/corrupt");
    let built = publisher.api.build(&pkg, src.path()).unwrap();
    publisher.api.push(&pkg, false).await.unwrap();
    let fragment = built.tree.entries["a.txt"].fragments[0];
    registry.corrupt_fragment(&fragment, b"tampered".to_vec());

    let consumer = Client::new(registry.clone());
    let dest = TempDir::new().unwrap();
    let target = dest.path().join("out");
    let err = consumer
        .api
        .install(&pkg, &Selector::Hash(built.root_hash), Some(&target), false)
        .await
        .unwrap_err();
    match err {
        ApiError::RegistryError(RegistryError::HashMismatch { expected, .. }) => {
            assert_eq!(expected, fragment)
        }
        other => panic!("expected HashMismatch, got {:?}", other),
    }
    assert!(!target.exists());
    assert!(!consumer.api.store().has(&fragment));
}

/// Installing an unknown package hash fails before touching the disk
#[tokio::test]
async fn test_unknown_hash() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    publish(&client, "alice/known", &[("a.txt", "x")]).await;
    let dest = TempDir::new().unwrap();
    let target = dest.path().join("out");

    let err = client
        .api
        .install(
            &package("alice/known"),
            &Selector::Hash([0x11; 32]),
            Some(&target),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownHash { .. }));
    assert!(!target.exists());
}

/// File modes survive the round trip
#[cfg(unix)]
#[tokio::test]
async fn test_executable_bit_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("run.sh", "#!/bin/sh\n")]);
    fs::set_permissions(src.path().join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
    let pkg = package("alice/script");
    let built = client.api.build(&pkg, src.path()).unwrap();
    client.api.push(&pkg, false).await.unwrap();

    let dest = TempDir::new().unwrap();
    client
        .api
        .install(&pkg, &Selector::Hash(built.root_hash), Some(dest.path()), false)
        .await
        .unwrap();
    let mode = fs::metadata(dest.path().join("run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
}

/// An existing file with the right bytes but the wrong permissions gets its
/// mode fixed instead of being reported unchanged
#[cfg(unix)]
#[tokio::test]
async fn test_existing_file_mode_is_fixed() {
    use std::os::unix::fs::PermissionsExt;

    let registry = Arc::new(MemoryRegistry::new());
    let client = Client::new(registry.clone());
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("run.sh", "#!/bin/sh\n")]);
    fs::set_permissions(src.path().join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
    let pkg = package("alice/script-mode");
    let built = client.api.build(&pkg, src.path()).unwrap();
    client.api.push(&pkg, false).await.unwrap();

    let dest = TempDir::new().unwrap();
    let target = dest.path().join("run.sh");
    fs::write(&target, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();

    let report = client
        .api
        .install(&pkg, &Selector::Hash(built.root_hash), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(report.files_written, 1);
    assert_eq!(report.files_unchanged, 0);
    assert_eq!(report.downloaded, 0);
    let mode = fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let again = client
        .api
        .install(&pkg, &Selector::Hash(built.root_hash), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(again.files_unchanged, 1);
}

/// A registry manifest claiming an enormous chunk size still installs
#[tokio::test]
async fn test_huge_chunk_size_manifest_installs() {
    let registry = Arc::new(MemoryRegistry::new());
    let session = Session::anonymous("memory://");
    let pkg = package("mallory/huge-chunks");

    let fragment = compute_content_hash(b"x");
    let mut tree = FragmentTree::new("directory");
    tree.metadata
        .insert(META_CHUNK_SIZE.to_string(), u64::MAX.to_string());
    tree.insert(
        "a.txt".to_string(),
        TreeEntry {
            fragments: vec![fragment],
            size: 1,
            mode: 0o644,
        },
    );
    let bytes = tree.canonical_bytes().unwrap();
    let root = compute_content_hash(&bytes);
    registry
        .upload_fragment(&session, &pkg, &fragment, b"x".to_vec())
        .await
        .unwrap();
    registry
        .upload_manifest(&session, &pkg, &root, bytes)
        .await
        .unwrap();

    let client = Client::new(registry.clone());
    let dest = TempDir::new().unwrap();
    fs::write(dest.path().join("a.txt"), "x").unwrap();
    let report = client
        .api
        .install(&pkg, &Selector::Hash(root), Some(dest.path()), false)
        .await
        .unwrap();
    assert_eq!(report.files_written + report.files_unchanged, 1);
    assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "x");
}
