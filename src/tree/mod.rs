//! Package trees
//!
//! Turns a source directory or build file into a fragment tree whose root
//! hash depends only on logical paths, fragment hashes, and metadata.

pub mod builder;
pub mod hasher;
pub mod manifest;
pub mod path;
pub mod walker;

pub use builder::{BuildOutput, BuildRequest, PackageBuilder};
pub use manifest::{FragmentTree, TreeEntry};
