//! Local storage
//!
//! The fragment store holds content-addressed bytes; the package index
//! remembers which root hash each package was last built to.

pub mod fragments;
pub mod persistence;

pub use fragments::FragmentStore;
pub use persistence::SledPackageIndex;

use crate::error::StorageError;
use crate::types::{hex_hash, Hash, PackageRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The most recent local build of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBuild {
    pub package: PackageRef,
    #[serde(with = "hex_hash")]
    pub root_hash: Hash,
    pub built_at: DateTime<Utc>,
    /// Directory or build file the package was built from
    pub source: String,
}

/// Package index interface
pub trait PackageIndex: Send + Sync {
    fn record_build(&self, build: &LocalBuild) -> Result<(), StorageError>;
    fn latest_build(&self, package: &PackageRef) -> Result<Option<LocalBuild>, StorageError>;
    /// All recorded packages, sorted by package name
    fn list(&self) -> Result<Vec<LocalBuild>, StorageError>;
    fn remove(&self, package: &PackageRef) -> Result<bool, StorageError>;
}
