//! Push and install synchronization
//!
//! Both directions move fragments with bounded parallelism and put a timeout
//! on every registry call. Neither retries on its own; both are safe to
//! re-run after a transient failure.

use crate::error::RegistryError;
use std::future::Future;
use std::time::Duration;

pub mod install;
pub mod push;

pub use install::{install, InstallReport};
pub use push::{push, PushReport};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_BATCH_SIZE: usize = 256;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Transfer tuning shared by push and install
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Parallel fragment transfers
    pub concurrency: usize,
    /// Hashes per existence check
    pub batch_size: usize,
    /// Upper bound on any single registry call
    pub timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Run one registry call under the configured timeout
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| RegistryError::Timeout(timeout.as_secs()))?
}
