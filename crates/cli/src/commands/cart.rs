//! Saved-cart commands.
//!
//! These talk to the saved-cart API directly, without a session, and are
//! meant for support and debugging.

use std::path::Path;

use indimitra_cart_sync::{CartGateway, GraphQlCartGateway, SyncConfig};
use indimitra_core::{CartSnapshot, SyncIdentity};
use serde_json::json;

use super::{CommandError, print_json};

/// Print the saved cart, or `null` when nothing is saved.
pub async fn show(config: &SyncConfig, identity: SyncIdentity) -> Result<(), CommandError> {
    let gateway = GraphQlCartGateway::new(&config.api)?;

    tracing::info!(%identity, "Fetching saved cart");
    match gateway.get_saved_cart(identity).await? {
        Some(saved) => print_json(&json!({
            "updatedAt": saved.updated_at,
            "items": saved.snapshot.item_count(),
            "empty": saved.snapshot.is_empty(),
            "cartData": saved.snapshot,
        })),
        None => {
            tracing::info!(%identity, "No saved cart");
            print_json(&serde_json::Value::Null)
        }
    }
}

/// Save the snapshot in `file` as the user's cart for the store.
pub async fn push(
    config: &SyncConfig,
    identity: SyncIdentity,
    file: &Path,
) -> Result<(), CommandError> {
    let contents = tokio::fs::read(file).await?;
    let snapshot: CartSnapshot = serde_json::from_slice(&contents)?;
    if snapshot.is_empty() {
        tracing::warn!(%identity, "Snapshot is empty; a live session would delete instead");
    }

    let gateway = GraphQlCartGateway::new(&config.api)?;
    gateway.save_cart(identity, &snapshot).await?;

    tracing::info!(%identity, items = snapshot.item_count(), "Saved cart");
    Ok(())
}

/// Delete the saved cart.
pub async fn delete(config: &SyncConfig, identity: SyncIdentity) -> Result<(), CommandError> {
    let gateway = GraphQlCartGateway::new(&config.api)?;

    if gateway.delete_saved_cart(identity).await? {
        tracing::info!(%identity, "Deleted saved cart");
    } else {
        tracing::info!(%identity, "No saved cart to delete");
    }
    Ok(())
}
