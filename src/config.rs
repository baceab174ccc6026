//! Configuration System
//!
//! Layered configuration: built-in defaults, the user's global file, the
//! workspace `quilt.toml`, then `QUILT__SECTION__KEY` environment variables.

use crate::logging::LoggingConfig;
use crate::sync::{SyncOptions, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use crate::tree::builder::DEFAULT_CHUNK_SIZE;
use crate::tree::walker::{default_ignore_patterns, WalkerConfig};
use crate::types::PackageRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

pub const DEFAULT_REGISTRY_URL: &str = "https://pkg.quiltdata.com";
pub const DEFAULT_INSTALL_ROOT: &str = "quilt_packages";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuiltConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Bearer token; `QUILT_TOKEN` takes precedence
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Parallel fragment transfers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Hashes per existence check
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
        }
    }
}

impl RegistryConfig {
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Local storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Fragment store and package index live under this directory
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

/// `$XDG_DATA_HOME/quilt/store` or the platform equivalent
pub fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "quilt")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".quilt").join("store"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn fragments_path(&self) -> PathBuf {
        self.store_path.clone()
    }

    pub fn index_path(&self) -> PathBuf {
        self.store_path.join("index")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory and file names skipped while walking a source directory
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl BuildConfig {
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            ignore_patterns: self.ignore_patterns.clone(),
            ..WalkerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Packages install to `{root}/{owner}/{name}` unless a destination is given
    #[serde(default = "default_install_root")]
    pub root: PathBuf,
}

fn default_install_root() -> PathBuf {
    PathBuf::from(DEFAULT_INSTALL_ROOT)
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            root: default_install_root(),
        }
    }
}

impl InstallConfig {
    pub fn destination_for(&self, package: &PackageRef) -> PathBuf {
        self.root.join(&package.owner).join(&package.name)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Registry(String),
    Storage(String),
    Build(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Registry(msg) => write!(f, "Registry: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Build(msg) => write!(f, "Build: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QuiltConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.registry.url.trim().is_empty() {
            errors.push(ValidationError::Registry("url cannot be empty".to_string()));
        }
        if self.registry.concurrency == 0 {
            errors.push(ValidationError::Registry(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.registry.batch_size == 0 {
            errors.push(ValidationError::Registry(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.registry.timeout_secs == 0 {
            errors.push(ValidationError::Registry(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "store_path cannot be empty".to_string(),
            ));
        }
        if self.build.chunk_size == 0 {
            errors.push(ValidationError::Build(
                "chunk_size must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
