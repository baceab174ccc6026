//! Property-based tests for fragment store deduplication

use proptest::prelude::*;
use quilt::store::FragmentStore;
use quilt::tree::hasher;
use tempfile::TempDir;

/// Storing the same bytes any number of times yields one fragment under
/// its content hash
#[test]
fn test_put_is_idempotent_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(64));

    runner
        .run(
            &(proptest::collection::vec(any::<u8>(), 0..2048), 1usize..4),
            |(bytes, repeats)| {
                let dir = TempDir::new().unwrap();
                let store = FragmentStore::new(dir.path()).unwrap();

                let hashes: Vec<_> = (0..repeats).map(|_| store.put(&bytes).unwrap()).collect();
                prop_assert!(hashes.windows(2).all(|w| w[0] == w[1]));
                prop_assert_eq!(hashes[0], hasher::compute_content_hash(&bytes));
                prop_assert_eq!(store.get(&hashes[0]).unwrap(), bytes);
                Ok(())
            },
        )
        .unwrap();
}

/// Bytes that do not match the claimed hash are never stored
#[test]
fn test_put_verified_rejects_mismatch_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(64));

    runner
        .run(
            &(
                proptest::collection::vec(any::<u8>(), 1..512),
                proptest::collection::vec(any::<u8>(), 1..512),
            ),
            |(claimed, actual)| {
                prop_assume!(claimed != actual);
                let dir = TempDir::new().unwrap();
                let store = FragmentStore::new(dir.path()).unwrap();
                let expected = hasher::compute_content_hash(&claimed);

                prop_assert!(store.put_verified(&expected, &actual).is_err());
                prop_assert!(!store.has(&expected));
                Ok(())
            },
        )
        .unwrap();
}
