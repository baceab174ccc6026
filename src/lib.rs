//! quilt: content-addressed data packages
//!
//! Build a directory or build file into an immutable, hash-identified
//! package, push its fragments to a registry with deduplication, and install
//! it elsewhere by hash, version, or tag.

pub mod api;
pub mod buildfile;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pointers;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod store;
pub mod sync;
pub mod tree;
pub mod types;
