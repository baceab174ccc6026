//! Persistence layer for the package index

use crate::error::StorageError;
use crate::store::{LocalBuild, PackageIndex};
use crate::types::PackageRef;
use std::path::Path;

const BUILD_PREFIX: &str = "build:";

fn index_err(context: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Index(format!("{}: {}", context, e))
}

fn build_key(package: &PackageRef) -> String {
    format!("{}{}", BUILD_PREFIX, package)
}

/// Sled-based implementation of PackageIndex
pub struct SledPackageIndex {
    db: sled::Db,
}

impl SledPackageIndex {
    /// Open the index database at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| index_err("Failed to open sled database", e))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| index_err("Failed to flush database", e))?;
        Ok(())
    }
}

impl PackageIndex for SledPackageIndex {
    fn record_build(&self, build: &LocalBuild) -> Result<(), StorageError> {
        let value =
            bincode::serialize(build).map_err(|e| index_err("Failed to serialize build", e))?;
        self.db
            .insert(build_key(&build.package).as_bytes(), value)
            .map_err(|e| index_err("Failed to record build", e))?;
        self.flush()
    }

    fn latest_build(&self, package: &PackageRef) -> Result<Option<LocalBuild>, StorageError> {
        match self
            .db
            .get(build_key(package).as_bytes())
            .map_err(|e| index_err("Failed to read build", e))?
        {
            Some(value) => {
                let build: LocalBuild = bincode::deserialize(&value)
                    .map_err(|e| index_err("Failed to deserialize build", e))?;
                Ok(Some(build))
            }
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<LocalBuild>, StorageError> {
        let mut builds = Vec::new();
        for item in self.db.scan_prefix(BUILD_PREFIX.as_bytes()) {
            let (_, value) = item.map_err(|e| index_err("Failed to iterate index", e))?;
            let build: LocalBuild = bincode::deserialize(&value)
                .map_err(|e| index_err("Failed to deserialize build", e))?;
            builds.push(build);
        }
        builds.sort_by(|a, b| a.package.cmp(&b.package));
        Ok(builds)
    }

    fn remove(&self, package: &PackageRef) -> Result<bool, StorageError> {
        let removed = self
            .db
            .remove(build_key(package).as_bytes())
            .map_err(|e| index_err("Failed to remove build", e))?;
        Ok(removed.is_some())
    }
}
