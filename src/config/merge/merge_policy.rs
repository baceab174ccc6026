//! Merge rules: defaults, override order, conflict handling.

use crate::config::{
    default_store_path, DEFAULT_INSTALL_ROOT, DEFAULT_REGISTRY_URL,
};
use crate::sync::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use crate::tree::builder::DEFAULT_CHUNK_SIZE;
use crate::tree::walker::default_ignore_patterns;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key; lists are replaced, not
/// appended.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("registry.url", DEFAULT_REGISTRY_URL)?
        .set_default("registry.timeout_secs", DEFAULT_TIMEOUT_SECS)?
        .set_default("registry.concurrency", DEFAULT_CONCURRENCY as u64)?
        .set_default("registry.batch_size", DEFAULT_BATCH_SIZE as u64)?
        .set_default(
            "storage.store_path",
            default_store_path().to_string_lossy().into_owned(),
        )?
        .set_default("build.chunk_size", DEFAULT_CHUNK_SIZE as u64)?
        .set_default("build.ignore_patterns", default_ignore_patterns())?
        .set_default("install.root", DEFAULT_INSTALL_ROOT)
}
