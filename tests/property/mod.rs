//! Property-based tests for content addressing guarantees

mod determinism;
mod store_dedup;
