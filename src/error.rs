//! Error types for the quilt package client.

use crate::types::{Hash, PackageRef};
use std::path::PathBuf;
use thiserror::Error;

fn hx(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Local storage errors (fragment store and package index)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Fragment not found: {}", hx(.0))]
    NotFound(Hash),

    #[error("Store corruption: expected {}, got {}", hx(.expected), hx(.actual))]
    StoreCorruption { expected: Hash, actual: Hash },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Package index error: {0}")]
    Index(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors reported by a registry client
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry object not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Registry conflict: {0}")]
    Conflict(String),

    #[error("Registry hash mismatch: expected {}, got {}", hx(.expected), hx(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Failed to connect to registry: {0}")]
    Transport(String),

    #[error("Registry request timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected registry response: {0}")]
    Protocol(String),
}

/// How callers should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself was wrong; do not retry.
    Input,
    /// Something asked for does not exist, or stored data is untrustworthy.
    Consistency,
    /// Network trouble; the operation is idempotent and may be re-run.
    Transient,
    /// Local environment failure (disk, configuration).
    Environment,
}

/// Top-level errors surfaced by the core operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid package name: {0} (expected owner/name)")]
    InvalidPackageRef(String),

    #[error("Invalid package hash: {0}")]
    InvalidHash(String),

    #[error("Invalid version: {0:?}")]
    InvalidVersion(String),

    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to parse build file {path}: {message}")]
    ManifestParseError { path: PathBuf, message: String },

    #[error("Specify either a directory or a build file, not both ({directory} and {build_file})")]
    AmbiguousInput {
        directory: PathBuf,
        build_file: PathBuf,
    },

    #[error("Specify at most one of --hash, --version, --tag")]
    AmbiguousSelector,

    #[error("{first} and {second} both map to package path {logical:?}")]
    DuplicatePath {
        logical: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{0} already exists; use --force to overwrite")]
    WouldOverwrite(PathBuf),

    #[error("No local build for {0}. Run `quilt build {0} <path>` first.")]
    NoLocalBuild(PackageRef),

    #[error("{package} has no build with hash {}", hx(.hash))]
    UnknownHash { package: PackageRef, hash: Hash },

    #[error("{package} has no version {version}")]
    UnknownVersion { package: PackageRef, version: String },

    #[error("{package} has no tag {tag}")]
    UnknownTag { package: PackageRef, tag: String },

    #[error("{package} version {version} already points to {}", hx(.existing))]
    VersionExists {
        package: PackageRef,
        version: String,
        existing: Hash,
    },

    #[error("Invalid manifest {}: {message}", hx(.root))]
    InvalidManifest { root: Hash, message: String },

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl ApiError {
    /// Classify the error for reporting and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::InvalidPackageRef(_)
            | ApiError::InvalidHash(_)
            | ApiError::InvalidVersion(_)
            | ApiError::InvalidTag(_)
            | ApiError::SourceNotFound(_)
            | ApiError::ManifestParseError { .. }
            | ApiError::AmbiguousInput { .. }
            | ApiError::AmbiguousSelector
            | ApiError::DuplicatePath { .. }
            | ApiError::WouldOverwrite(_)
            | ApiError::NoLocalBuild(_) => ErrorClass::Input,
            ApiError::UnknownHash { .. }
            | ApiError::UnknownVersion { .. }
            | ApiError::UnknownTag { .. }
            | ApiError::VersionExists { .. }
            | ApiError::InvalidManifest { .. } => ErrorClass::Consistency,
            ApiError::StorageError(e) => match e {
                StorageError::NotFound(_) | StorageError::StoreCorruption { .. } => {
                    ErrorClass::Consistency
                }
                StorageError::InvalidPath(_) => ErrorClass::Input,
                StorageError::Index(_) | StorageError::IoError(_) => ErrorClass::Environment,
            },
            ApiError::RegistryError(e) => match e {
                RegistryError::Transport(_) | RegistryError::Timeout(_) => ErrorClass::Transient,
                RegistryError::Unauthorized(_) => ErrorClass::Input,
                RegistryError::NotFound(_)
                | RegistryError::Conflict(_)
                | RegistryError::HashMismatch { .. } => ErrorClass::Consistency,
                RegistryError::Protocol(_) => ErrorClass::Environment,
            },
            ApiError::Serialization(_) | ApiError::ConfigError(_) => ErrorClass::Environment,
        }
    }

    /// Only transient failures are worth re-running.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
