//! Local snapshot cache commands.

use indimitra_cart_sync::{SnapshotCache, SnapshotCacheBackend, SyncConfig};
use indimitra_core::StoreId;

use super::{CommandError, print_json};

/// Print the local snapshot for a store, or `null` when there is none.
pub async fn show(config: &SyncConfig, store_id: StoreId) -> Result<(), CommandError> {
    let Some(dir) = config.cache_dir.as_deref() else {
        tracing::warn!("CART_SYNC_CACHE_DIR is empty; snapshots are kept in memory only");
        return print_json(&serde_json::Value::Null);
    };

    let cache = SnapshotCacheBackend::from_dir(Some(dir));
    let snapshot = cache.load(store_id).await?;
    if snapshot.is_none() {
        tracing::info!(store_id = %store_id, dir = %dir.display(), "No local snapshot");
    }
    print_json(&snapshot)
}
