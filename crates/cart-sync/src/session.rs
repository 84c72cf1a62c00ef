//! Cart session - the process-wide owner of cart synchronization.
//!
//! A [`CartSession`] owns the [`CartStore`], the identity channel and the
//! coordinator task. Create one when the application starts and shut it
//! down when it exits:
//!
//! ```rust,ignore
//! let gateway = GraphQlCartGateway::new(&config.api)?;
//! let cache = SnapshotCacheBackend::from_dir(config.cache_dir.as_deref());
//! let session = CartSession::start(gateway, cache, &config.settings);
//!
//! session.select_store(Some(StoreId::new(4))).await;
//! session.sign_in(UserId::new(17));
//! session.store().add_item("p1", Map::new());
//!
//! session.shutdown().await;
//! ```
//!
//! UI code mutates the cart through [`CartSession::store`] and reports who is
//! signed in and which store is selected; synchronization follows from
//! those.

use std::sync::Arc;

use indimitra_core::{CartSnapshot, SessionIdentity, StoreId, UserId};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::SnapshotCache;
use crate::config::SyncSettings;
use crate::coordinator::{Coordinator, CoordinatorInputs, SyncStatus};
use crate::gateway::CartGateway;
use crate::store::CartStore;

/// Running cart synchronization for one client.
#[derive(Debug)]
pub struct CartSession<C: SnapshotCache> {
    store: CartStore,
    cache: Arc<C>,
    identity: watch::Sender<SessionIdentity>,
    status: watch::Receiver<SyncStatus>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl<C: SnapshotCache> CartSession<C> {
    /// Create the cart store and start the coordinator task.
    ///
    /// The session starts with no identity, so nothing is synchronized until
    /// both a user and a store are known.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if
    /// `settings.event_capacity` is zero.
    pub fn start<G: CartGateway>(gateway: G, cache: C, settings: &SyncSettings) -> Self {
        let store = CartStore::with_capacity(settings.event_capacity);
        let cache = Arc::new(cache);

        let (identity, identity_rx) = watch::channel(SessionIdentity::default());
        let (status_tx, status) = watch::channel(SyncStatus::Suspended);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let coordinator = Coordinator::new(
            Arc::new(gateway),
            Arc::clone(&cache),
            store.clone(),
            settings,
            status_tx,
        );
        // Subscribe before returning so no mutation is missed
        let inputs = CoordinatorInputs {
            identity: identity_rx,
            changes: store.subscribe(),
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(coordinator.run(inputs));

        debug!(debounce_ms = settings.debounce.as_millis(), "Cart session started");

        Self {
            store,
            cache,
            identity,
            status,
            shutdown,
            task,
        }
    }

    /// The cart store.
    #[must_use]
    pub const fn store(&self) -> &CartStore {
        &self.store
    }

    /// The snapshot cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Current sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Receiver for sync status updates.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Currently announced identity.
    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        *self.identity.borrow()
    }

    /// Announce the signed-in user and selected store.
    ///
    /// Announcing the same identity again is harmless.
    pub fn set_identity(&self, identity: SessionIdentity) {
        self.identity.send_replace(identity);
    }

    /// Record a sign-in, keeping the selected store.
    pub fn sign_in(&self, user_id: UserId) {
        let store_id = self.identity().store_id;
        self.set_identity(SessionIdentity::new(Some(user_id), store_id));
    }

    /// Record a sign-out. The local cart is kept.
    pub fn sign_out(&self) {
        let store_id = self.identity().store_id;
        self.set_identity(SessionIdentity::new(None, store_id));
    }

    /// Switch to another store's cart.
    ///
    /// The new store's local snapshot (or an empty cart when there is none)
    /// replaces the cart before the new identity is announced, so the sync
    /// for the new store starts from that store's cart. The replaced cart is
    /// written to its own store's snapshot, which keeps edits still waiting
    /// on the debounce; the next load for that store pushes them. Selecting
    /// `None` empties the cart and suspends synchronization.
    pub async fn select_store(&self, store_id: Option<StoreId>) {
        let current = self.identity();
        let announced = SessionIdentity::new(current.user_id, store_id);
        if self.store.state().store_id == store_id {
            // The cart already belongs to this store
            self.set_identity(announced);
            return;
        }

        let snapshot = match store_id {
            Some(store_id) => self.load_snapshot(store_id).await,
            None => CartSnapshot::default(),
        };
        let outgoing = self.store.switch_store(store_id, snapshot);
        if let Some(previous) = outgoing.store_id
            && let Err(e) = self.cache.store(previous, &outgoing.snapshot).await
        {
            warn!(store_id = %previous, error = %e, "Failed to write local cart snapshot");
        }
        self.set_identity(announced);
    }

    async fn load_snapshot(&self, store_id: StoreId) -> CartSnapshot {
        match self.cache.load(store_id).await {
            Ok(Some(snapshot)) => {
                debug!(store_id = %store_id, items = snapshot.items.len(), "Loaded local cart snapshot");
                snapshot
            }
            Ok(None) => CartSnapshot::default(),
            Err(e) => {
                warn!(store_id = %store_id, error = %e, "Failed to read local cart snapshot");
                CartSnapshot::default()
            }
        }
    }

    /// Stop the coordinator and wait for it to exit.
    ///
    /// A pending debounced save is dropped. Remote calls already in flight
    /// run to completion in the background.
    pub async fn shutdown(self) {
        let Self {
            shutdown, task, ..
        } = self;

        // The task may already have exited
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            error!(error = %e, "Cart sync task failed");
        }
    }
}
