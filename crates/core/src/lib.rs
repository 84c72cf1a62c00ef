//! Indimitra Core - Shared types library.
//!
//! This crate provides common types used across all Indimitra cart components:
//! - `cart-sync` - Cart reconciliation between the local store and the saved-cart API
//! - `cli` - Command-line tools for inspecting and driving cart sync
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async runtime. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the cart snapshot and sync identities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
