//! Core types for Indimitra.
//!
//! This module provides type-safe wrappers for the cart sync domain.

pub mod id;
pub mod identity;
pub mod snapshot;

pub use id::*;
pub use identity::{SessionIdentity, SyncIdentity};
pub use snapshot::{
    CartItems, CartLine, CartSnapshot, DeliveryType, DeliveryTypeError, ListInputAnswers,
    PickupAddress, ProductKey, is_cart_empty,
};
