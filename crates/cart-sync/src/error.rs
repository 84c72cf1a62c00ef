//! Unified error type for callers of the one-shot cart operations.
//!
//! The background coordinator never surfaces errors; it logs and carries on.
//! Anything driven directly (the CLI, embedding applications) gets a
//! [`SyncError`] instead.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;

/// Errors returned by cart sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Saved-cart API operation failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Local snapshot cache operation failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Whether retrying the same operation later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Gateway(GatewayError::Http(_) | GatewayError::RateLimited(_))
        )
    }
}
