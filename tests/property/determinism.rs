//! Property-based tests for build determinism

use proptest::prelude::*;
use quilt::store::FragmentStore;
use quilt::tree::hasher;
use quilt::tree::walker::WalkerConfig;
use quilt::tree::PackageBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn file_set() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    proptest::collection::btree_map(
        "[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.dat",
        proptest::collection::vec(any::<u8>(), 0..300),
        1..6,
    )
}

fn write_all(root: &std::path::Path, files: &BTreeMap<String, Vec<u8>>) {
    // Reverse order so creation order differs from the sorted manifest order.
    for (logical, bytes) in files.iter().rev() {
        let path = root.join(logical);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }
}

/// The same file set always produces the same root hash, wherever it lives
/// and whichever store builds it
#[test]
fn test_root_hash_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&(file_set(), 1usize..64), |(files, chunk_size)| {
            let a = TempDir::new().unwrap();
            let b = TempDir::new().unwrap();
            write_all(a.path(), &files);
            write_all(b.path(), &files);

            let store_a = TempDir::new().unwrap();
            let store_b = TempDir::new().unwrap();
            let build = |store: &TempDir, src: &TempDir| {
                PackageBuilder::with_options(
                    Arc::new(FragmentStore::new(store.path()).unwrap()),
                    chunk_size,
                    WalkerConfig::default(),
                )
                .build_path(src.path())
                .unwrap()
            };
            let first = build(&store_a, &a);
            let second = build(&store_b, &b);

            prop_assert_eq!(first.root_hash, second.root_hash);
            prop_assert_eq!(first.tree.entries.len(), files.len());
            Ok(())
        })
        .unwrap();
}

/// Every file's fragments concatenate back to its bytes and each fragment
/// hashes to its name
#[test]
fn test_fragments_reassemble_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(
            &(proptest::collection::vec(any::<u8>(), 0..1000), 1usize..200),
            |(bytes, chunk_size)| {
                let src = TempDir::new().unwrap();
                fs::write(src.path().join("blob.bin"), &bytes).unwrap();
                let store_dir = TempDir::new().unwrap();
                let store = Arc::new(FragmentStore::new(store_dir.path()).unwrap());
                let output = PackageBuilder::with_options(
                    Arc::clone(&store),
                    chunk_size,
                    WalkerConfig::default(),
                )
                .build_path(src.path())
                .unwrap();

                let entry = &output.tree.entries["blob.bin"];
                prop_assert_eq!(entry.size, bytes.len() as u64);
                prop_assert_eq!(entry.fragments.len(), bytes.len().div_ceil(chunk_size));

                let mut reassembled = Vec::new();
                for hash in &entry.fragments {
                    let fragment = store.get(hash).unwrap();
                    prop_assert_eq!(&hasher::compute_content_hash(&fragment), hash);
                    reassembled.extend(fragment);
                }
                prop_assert_eq!(reassembled, bytes);
                Ok(())
            },
        )
        .unwrap();
}
