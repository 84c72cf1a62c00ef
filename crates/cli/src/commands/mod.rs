//! CLI subcommands.

pub mod cache;
pub mod cart;
pub mod session;

use indimitra_cart_sync::{CacheError, GatewayError, SyncError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Cart sync operation failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot JSON could not be read or written.
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GatewayError> for CommandError {
    fn from(e: GatewayError) -> Self {
        Self::Sync(e.into())
    }
}

impl From<CacheError> for CommandError {
    fn from(e: CacheError) -> Self {
        Self::Sync(e.into())
    }
}

/// Print a value as pretty JSON on stdout.
#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
