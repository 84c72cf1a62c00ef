//! Indimitra cart sync.
//!
//! Keeps the client-side cart consistent with the cart saved on the server
//! for the signed-in user and selected store, across sign-ins, store
//! switches and restarts, while saving as rarely as possible.
//!
//! # Modules
//!
//! - [`store`] - reactive in-memory cart state
//! - [`session`] - process-wide owner of the store and the sync task
//! - [`gateway`] - saved-cart API client
//! - [`cache`] - per-store local snapshots
//! - [`debounce`] - restartable delay timer
//! - [`config`] - environment configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
mod coordinator;
pub mod debounce;
pub mod error;
pub mod gateway;
pub mod session;
pub mod store;

pub use cache::{
    CacheError, FileSnapshotCache, MemorySnapshotCache, SnapshotCache, SnapshotCacheBackend,
};
pub use config::{ApiConfig, ConfigError, SyncConfig, SyncSettings};
pub use coordinator::SyncStatus;
pub use error::SyncError;
pub use gateway::{CartGateway, GatewayError, GraphQlCartGateway, RemoteCart};
pub use session::CartSession;
pub use store::{CartChange, CartState, CartStore};
