//! Local snapshot cache - durable per-store copies of the cart.
//!
//! Every time the coordinator persists a cart it first writes the snapshot
//! here, keyed by store, so a restart or a store switch can bring the cart
//! back without a round trip. Writes are best-effort: callers log failures
//! and carry on.
//!
//! Two backends are provided:
//! - [`FileSnapshotCache`] - one JSON file per store, atomically replaced
//! - [`MemorySnapshotCache`] - bounded in-process cache (`moka`), for tests
//!   and for sessions that should not touch the disk

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use indimitra_core::{CartSnapshot, StoreId};
use moka::future::Cache;
use thiserror::Error;
use tracing::debug;

/// Prefix of every snapshot key.
pub const SNAPSHOT_KEY_PREFIX: &str = "indimitra-cart-store-";

const MEMORY_CACHE_CAPACITY: u64 = 64;

/// Key under which a store's cart snapshot is kept.
#[must_use]
pub fn snapshot_cache_key(store_id: StoreId) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{store_id}")
}

/// Errors from the snapshot cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a snapshot file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking write task panicked or was cancelled.
    #[error("Snapshot write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Durable key-value storage for per-store cart snapshots.
pub trait SnapshotCache: Send + Sync + 'static {
    /// Load the snapshot for a store, if one was stored.
    fn load(
        &self,
        store_id: StoreId,
    ) -> impl Future<Output = Result<Option<CartSnapshot>, CacheError>> + Send;

    /// Replace the snapshot for a store.
    fn store(
        &self,
        store_id: StoreId,
        snapshot: &CartSnapshot,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
}

// =============================================================================
// File Backend
// =============================================================================

/// Snapshot cache storing one JSON file per store in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotCache {
    dir: PathBuf,
}

impl FileSnapshotCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshot files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for a store.
    #[must_use]
    pub fn snapshot_path(&self, store_id: StoreId) -> PathBuf {
        self.dir.join(format!("{}.json", snapshot_cache_key(store_id)))
    }
}

impl SnapshotCache for FileSnapshotCache {
    async fn load(&self, store_id: StoreId) -> Result<Option<CartSnapshot>, CacheError> {
        let path = self.snapshot_path(store_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn store(&self, store_id: StoreId, snapshot: &CartSnapshot) -> Result<(), CacheError> {
        let contents = serde_json::to_vec_pretty(snapshot)?;
        let dir = self.dir.clone();
        let path = self.snapshot_path(store_id);
        tokio::task::spawn_blocking(move || atomic_write(&dir, &path, &contents)).await??;
        debug!(store_id = %store_id, "Wrote local cart snapshot");
        Ok(())
    }
}

/// Write `data` to `path` by persisting a temp file from the same directory.
fn atomic_write(dir: &Path, path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let io_error = |source: io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_error)?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    std::fs::write(temp.path(), data).map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

// =============================================================================
// Memory Backend
// =============================================================================

/// Snapshot cache kept in memory for the life of the process.
#[derive(Clone)]
pub struct MemorySnapshotCache {
    entries: Cache<String, CartSnapshot>,
}

impl std::fmt::Debug for MemorySnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySnapshotCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MemorySnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotCache {
    /// Create an empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().max_capacity(MEMORY_CACHE_CAPACITY).build(),
        }
    }
}

impl SnapshotCache for MemorySnapshotCache {
    async fn load(&self, store_id: StoreId) -> Result<Option<CartSnapshot>, CacheError> {
        Ok(self.entries.get(&snapshot_cache_key(store_id)).await)
    }

    async fn store(&self, store_id: StoreId, snapshot: &CartSnapshot) -> Result<(), CacheError> {
        self.entries
            .insert(snapshot_cache_key(store_id), snapshot.clone())
            .await;
        Ok(())
    }
}

// =============================================================================
// Configured Backend
// =============================================================================

/// Snapshot cache backend selected at runtime from configuration.
#[derive(Debug, Clone)]
pub enum SnapshotCacheBackend {
    /// Snapshots on disk.
    File(FileSnapshotCache),
    /// Snapshots in memory.
    Memory(MemorySnapshotCache),
}

impl SnapshotCacheBackend {
    /// File cache when a directory is configured, memory cache otherwise.
    #[must_use]
    pub fn from_dir(dir: Option<&Path>) -> Self {
        dir.map_or_else(
            || Self::Memory(MemorySnapshotCache::new()),
            |dir| Self::File(FileSnapshotCache::new(dir)),
        )
    }
}

impl SnapshotCache for SnapshotCacheBackend {
    async fn load(&self, store_id: StoreId) -> Result<Option<CartSnapshot>, CacheError> {
        match self {
            Self::File(cache) => cache.load(store_id).await,
            Self::Memory(cache) => cache.load(store_id).await,
        }
    }

    async fn store(&self, store_id: StoreId, snapshot: &CartSnapshot) -> Result<(), CacheError> {
        match self {
            Self::File(cache) => cache.store(store_id, snapshot).await,
            Self::Memory(cache) => cache.store(store_id, snapshot).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use indimitra_core::CartLine;
    use tempfile::TempDir;

    fn snapshot_with(key: &str, quantity: u32) -> CartSnapshot {
        let mut snapshot = CartSnapshot::default();
        snapshot.items.insert(key.into(), CartLine::new(quantity));
        snapshot
    }

    #[test]
    fn test_snapshot_cache_key() {
        assert_eq!(
            snapshot_cache_key(StoreId::new(12)),
            "indimitra-cart-store-12"
        );
    }

    #[tokio::test]
    async fn test_file_cache_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(dir.path());
        assert_eq!(cache.load(StoreId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("nested/carts"));
        let snapshot = snapshot_with("p1", 2);

        cache.store(StoreId::new(4), &snapshot).await.unwrap();

        assert!(cache.snapshot_path(StoreId::new(4)).exists());
        assert_eq!(cache.load(StoreId::new(4)).await.unwrap(), Some(snapshot));
        assert_eq!(cache.load(StoreId::new(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(dir.path());

        cache
            .store(StoreId::new(4), &snapshot_with("p1", 2))
            .await
            .unwrap();
        cache
            .store(StoreId::new(4), &CartSnapshot::default())
            .await
            .unwrap();

        assert_eq!(
            cache.load(StoreId::new(4)).await.unwrap(),
            Some(CartSnapshot::default())
        );
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_snapshot_is_error() {
        let dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(dir.path());
        std::fs::write(cache.snapshot_path(StoreId::new(9)), b"{not json").unwrap();

        let result = cache.load(StoreId::new(9)).await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_file_cache_reads_null_fields_as_empty() {
        let dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(dir.path());
        std::fs::write(
            cache.snapshot_path(StoreId::new(3)),
            br#"{"cart": null, "customOrder": null, "listInputAnswers": null}"#,
        )
        .unwrap();

        assert_eq!(
            cache.load(StoreId::new(3)).await.unwrap(),
            Some(CartSnapshot::default())
        );
    }

    #[tokio::test]
    async fn test_memory_cache_is_keyed_by_store() {
        let cache = MemorySnapshotCache::new();
        cache
            .store(StoreId::new(1), &snapshot_with("p1", 1))
            .await
            .unwrap();

        assert_eq!(
            cache.load(StoreId::new(1)).await.unwrap(),
            Some(snapshot_with("p1", 1))
        );
        assert_eq!(cache.load(StoreId::new(2)).await.unwrap(), None);
    }

    #[test]
    fn test_backend_from_dir() {
        assert!(matches!(
            SnapshotCacheBackend::from_dir(None),
            SnapshotCacheBackend::Memory(_)
        ));
        assert!(matches!(
            SnapshotCacheBackend::from_dir(Some(Path::new("/tmp/carts"))),
            SnapshotCacheBackend::File(_)
        ));
    }
}
