//! Reconciliation coordinator.
//!
//! A single task that keeps the local cart and the saved cart for the
//! current `(user, store)` identity in agreement:
//!
//! - When a complete identity appears or changes it fetches the saved cart
//!   and merges by presence: an empty local cart is restored from the
//!   server, a non-empty local cart is pushed to it.
//! - Once that load has finished, cart mutations are debounced and the
//!   trailing state is written to the local snapshot cache and then saved
//!   (or deleted when the cart became empty).
//!
//! The task owns all mutable sync state. Network calls run in spawned tasks
//! that report back over an internal channel, so nothing here is shared or
//! locked.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indimitra_core::{CartSnapshot, SessionIdentity, SyncIdentity};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::cache::SnapshotCache;
use crate::config::SyncSettings;
use crate::debounce::Debouncer;
use crate::gateway::CartGateway;
use crate::store::{CartChange, CartState, CartStore};

/// Observable state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "identity", rename_all = "snake_case")]
pub enum SyncStatus {
    /// User or store is missing; nothing is synchronized.
    Suspended,
    /// The saved cart for this identity is being fetched and merged.
    Loading(SyncIdentity),
    /// Initial load finished; cart changes are being saved.
    Ready(SyncIdentity),
    /// The coordinator task has exited.
    Stopped,
}

impl SyncStatus {
    /// Identity being synchronized, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<SyncIdentity> {
        match self {
            Self::Loading(identity) | Self::Ready(identity) => Some(*identity),
            Self::Suspended | Self::Stopped => None,
        }
    }

    /// Whether the initial load has finished.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Completions reported to the coordinator task.
#[derive(Debug)]
enum SyncEvent {
    /// A load task finished without being cancelled.
    LoadFinished { generation: u64 },
    /// The debounce timer with this ticket fired.
    DebounceElapsed { ticket: u64 },
    /// A remote save or delete settled, successfully or not.
    WriteSettled { identity: SyncIdentity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Idle,
    Loading,
    Loaded,
}

/// Whether `state` may be synchronized as the cart of `identity`.
///
/// A cart that was never assigned to a store belongs to whichever store is
/// active.
fn belongs_to(state: &CartState, identity: SyncIdentity) -> bool {
    state.store_id.is_none_or(|store_id| store_id == identity.store_id)
}

/// Receiving ends the coordinator task listens on.
pub(crate) struct CoordinatorInputs {
    pub identity: watch::Receiver<SessionIdentity>,
    pub changes: broadcast::Receiver<CartChange>,
    pub shutdown: oneshot::Receiver<()>,
}

pub(crate) struct Coordinator<G, C> {
    gateway: Arc<G>,
    cache: Arc<C>,
    store: CartStore,
    status: watch::Sender<SyncStatus>,

    identity: Option<SyncIdentity>,
    phase: LoadPhase,
    /// Bumped on every identity change; a load whose generation is no longer
    /// current is discarded.
    generation: Arc<AtomicU64>,
    /// Revision of the store when the current load finished. Earlier change
    /// events (the restore among them) are ignored.
    loaded_revision: u64,

    debouncer: Debouncer,
    /// Ticket of the debounce timer that may flush. Firings of earlier timers
    /// can still be queued after a reschedule and are ignored.
    armed: Option<u64>,
    in_flight: HashSet<SyncIdentity>,

    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
}

impl<G: CartGateway, C: SnapshotCache> Coordinator<G, C> {
    pub(crate) fn new(
        gateway: Arc<G>,
        cache: Arc<C>,
        store: CartStore,
        settings: &SyncSettings,
        status: watch::Sender<SyncStatus>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let debounce_tx = events_tx.clone();
        let debouncer = Debouncer::new(settings.debounce, move |ticket| {
            let _ = debounce_tx.send(SyncEvent::DebounceElapsed { ticket });
        });

        Self {
            gateway,
            cache,
            store,
            status,
            identity: None,
            phase: LoadPhase::Idle,
            generation: Arc::new(AtomicU64::new(0)),
            loaded_revision: 0,
            debouncer,
            armed: None,
            in_flight: HashSet::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Run until shutdown is requested or the session goes away.
    pub(crate) async fn run(mut self, inputs: CoordinatorInputs) {
        let CoordinatorInputs {
            identity: mut identity_rx,
            mut changes,
            mut shutdown,
        } = inputs;
        let Some(mut events_rx) = self.events_rx.take() else {
            return;
        };

        let initial = *identity_rx.borrow_and_update();
        self.on_identity_change(initial);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Cart sync shutdown requested");
                    break;
                }

                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        debug!("Cart session dropped");
                        break;
                    }
                    let identity = *identity_rx.borrow_and_update();
                    self.on_identity_change(identity);
                }

                Some(event) = events_rx.recv() => self.on_event(event),

                change = changes.recv() => match change {
                    Ok(change) => self.on_cart_change(&change),
                    Err(RecvError::Lagged(skipped)) => self.on_lagged(skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.debouncer.cancel();
        self.status.send_replace(SyncStatus::Stopped);
        info!("Cart sync stopped");
    }

    // =========================================================================
    // Identity
    // =========================================================================

    fn on_identity_change(&mut self, session: SessionIdentity) {
        let Some(identity) = session.sync_identity() else {
            self.suspend();
            return;
        };

        if self.identity == Some(identity) && self.phase != LoadPhase::Idle {
            debug!(%identity, "Identity unchanged, skipping load");
            return;
        }

        self.begin_load(identity);
    }

    fn suspend(&mut self) {
        if self.identity.take().is_some() {
            info!("Cart sync suspended until user and store are both known");
        }
        self.phase = LoadPhase::Idle;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_flush();
        self.status.send_replace(SyncStatus::Suspended);
    }

    fn begin_load(&mut self, identity: SyncIdentity) {
        self.identity = Some(identity);
        self.phase = LoadPhase::Loading;
        self.cancel_flush();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(SyncStatus::Loading(identity));
        info!(%identity, "Loading saved cart");

        let task = LoadTask {
            gateway: Arc::clone(&self.gateway),
            cache: Arc::clone(&self.cache),
            store: self.store.clone(),
            current_generation: Arc::clone(&self.generation),
            generation,
            identity,
            events_tx: self.events_tx.clone(),
        };
        tokio::spawn(task.run());
    }

    // =========================================================================
    // Internal Events
    // =========================================================================

    fn on_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::LoadFinished { generation } => self.on_load_finished(generation),
            SyncEvent::DebounceElapsed { ticket } => {
                if self.armed == Some(ticket) {
                    self.armed = None;
                    self.flush();
                }
            }
            SyncEvent::WriteSettled { identity } => {
                self.in_flight.remove(&identity);
            }
        }
    }

    fn on_load_finished(&mut self, generation: u64) {
        if generation != self.generation.load(Ordering::SeqCst) || self.phase != LoadPhase::Loading
        {
            return;
        }
        let Some(identity) = self.identity else {
            return;
        };

        self.phase = LoadPhase::Loaded;
        self.loaded_revision = self.store.revision();
        self.status.send_replace(SyncStatus::Ready(identity));
        debug!(%identity, revision = self.loaded_revision, "Saved cart load complete");
    }

    // =========================================================================
    // Cart Changes
    // =========================================================================

    fn on_cart_change(&mut self, change: &CartChange) {
        if self.phase != LoadPhase::Loaded || change.revision <= self.loaded_revision {
            return;
        }
        let Some(identity) = self.identity else {
            return;
        };
        if !belongs_to(&change.current, identity) || !change.cart_changed() {
            return;
        }
        self.schedule_flush();
    }

    fn on_lagged(&mut self, skipped: u64) {
        warn!(skipped, "Cart change events were dropped; saving current cart");
        if self.phase != LoadPhase::Loaded {
            return;
        }
        if let Some(identity) = self.identity
            && belongs_to(&self.store.state(), identity)
        {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&mut self) {
        self.armed = Some(self.debouncer.schedule());
    }

    fn cancel_flush(&mut self) {
        self.debouncer.cancel();
        self.armed = None;
    }

    /// Persist the current cart: local snapshot first, then the remote save
    /// or delete.
    fn flush(&mut self) {
        if self.phase != LoadPhase::Loaded {
            return;
        }
        let Some(identity) = self.identity else {
            return;
        };
        if self.in_flight.contains(&identity) {
            debug!(%identity, "Cart write already in flight, skipping");
            return;
        }

        let state = self.store.state();
        if !belongs_to(&state, identity) {
            return;
        }
        let snapshot = state.snapshot.clone();

        self.in_flight.insert(identity);
        let gateway = Arc::clone(&self.gateway);
        let cache = Arc::clone(&self.cache);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = cache.store(identity.store_id, &snapshot).await {
                warn!(%identity, error = %e, "Failed to write local cart snapshot");
            }

            if snapshot.is_empty() {
                match gateway.delete_saved_cart(identity).await {
                    Ok(deleted) => debug!(%identity, deleted, "Deleted saved cart"),
                    Err(e) => error!(%identity, error = %e, "Failed to delete saved cart"),
                }
            } else {
                match gateway.save_cart(identity, &snapshot).await {
                    Ok(()) => debug!(%identity, items = snapshot.items.len(), "Saved cart"),
                    Err(e) => error!(%identity, error = %e, "Failed to save cart"),
                }
            }

            let _ = events_tx.send(SyncEvent::WriteSettled { identity });
        });
    }
}

/// Fetch-and-merge for one identity, run off the coordinator task.
struct LoadTask<G, C> {
    gateway: Arc<G>,
    cache: Arc<C>,
    store: CartStore,
    current_generation: Arc<AtomicU64>,
    generation: u64,
    identity: SyncIdentity,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
}

impl<G: CartGateway, C: SnapshotCache> LoadTask<G, C> {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    async fn run(self) {
        let identity = self.identity;

        match self.gateway.get_saved_cart(identity).await {
            Ok(remote) => {
                if !self.is_current() {
                    debug!(%identity, "Identity changed during load, discarding result");
                    return;
                }
                self.merge(remote.map(|remote| remote.snapshot)).await;
            }
            Err(e) => error!(%identity, error = %e, "Failed to load saved cart"),
        }

        if !self.is_current() {
            return;
        }
        let _ = self.events_tx.send(SyncEvent::LoadFinished {
            generation: self.generation,
        });
    }

    /// Restore an empty local cart from the server, or push a non-empty one.
    async fn merge(&self, remote: Option<CartSnapshot>) {
        let identity = self.identity;

        if let Some(remote) = remote {
            let restored = self.store.restore_cart_if(remote.clone(), |state| {
                self.is_current() && belongs_to(state, identity) && state.snapshot.is_empty()
            });
            if restored {
                info!(%identity, items = remote.items.len(), "Restored saved cart");
                if let Err(e) = self.cache.store(identity.store_id, &remote).await {
                    warn!(%identity, error = %e, "Failed to write local cart snapshot");
                }
                return;
            }
        }

        let local = self.store.state();
        if !self.is_current() || !belongs_to(&local, identity) {
            return;
        }
        if local.snapshot.is_empty() {
            debug!(%identity, "Nothing to reconcile");
            return;
        }

        match self.gateway.save_cart(identity, &local.snapshot).await {
            Ok(()) => info!(%identity, "Pushed local cart to server"),
            Err(e) => error!(%identity, error = %e, "Failed to push local cart"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use indimitra_core::{StoreId, UserId};
    use serde_json::Map;

    use crate::cache::MemorySnapshotCache;
    use crate::gateway::{GatewayError, RemoteCart};

    fn identity(store: i32) -> SyncIdentity {
        SyncIdentity::new(UserId::new(1), StoreId::new(store))
    }

    /// Gateway with nothing saved that counts saves.
    #[derive(Debug, Default)]
    struct CountingGateway {
        saves: AtomicUsize,
    }

    impl CartGateway for CountingGateway {
        async fn get_saved_cart(
            &self,
            _identity: SyncIdentity,
        ) -> Result<Option<RemoteCart>, GatewayError> {
            Ok(None)
        }

        async fn save_cart(
            &self,
            _identity: SyncIdentity,
            _snapshot: &CartSnapshot,
        ) -> Result<(), GatewayError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_saved_cart(&self, _identity: SyncIdentity) -> Result<bool, GatewayError> {
            Ok(false)
        }
    }

    fn loaded_coordinator(
        gateway: &Arc<CountingGateway>,
    ) -> Coordinator<CountingGateway, MemorySnapshotCache> {
        let (status, _) = watch::channel(SyncStatus::Suspended);
        let mut coordinator = Coordinator::new(
            Arc::clone(gateway),
            Arc::new(MemorySnapshotCache::new()),
            CartStore::new(),
            &SyncSettings::default(),
            status,
        );
        coordinator.identity = Some(identity(4));
        coordinator.phase = LoadPhase::Loaded;
        coordinator
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_debounce_firing_does_not_flush() {
        let gateway = Arc::new(CountingGateway::default());
        let mut coordinator = loaded_coordinator(&gateway);
        coordinator.store.add_item("p1", Map::new());

        // A firing already queued when the timer is rescheduled
        coordinator.schedule_flush();
        let superseded = coordinator.debouncer.ticket();
        coordinator.schedule_flush();

        coordinator.on_event(SyncEvent::DebounceElapsed { ticket: superseded });
        assert!(coordinator.in_flight.is_empty());
        assert!(coordinator.armed.is_some());

        let current = coordinator.debouncer.ticket();
        coordinator.on_event(SyncEvent::DebounceElapsed { ticket: current });
        assert!(coordinator.in_flight.contains(&identity(4)));
        assert_eq!(coordinator.armed, None);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_flush_ignores_late_firing() {
        let gateway = Arc::new(CountingGateway::default());
        let mut coordinator = loaded_coordinator(&gateway);
        coordinator.store.add_item("p1", Map::new());

        coordinator.schedule_flush();
        let ticket = coordinator.debouncer.ticket();
        coordinator.cancel_flush();

        coordinator.on_event(SyncEvent::DebounceElapsed { ticket });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coordinator.in_flight.is_empty());
        assert_eq!(gateway.saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_belongs_to_unassigned_cart() {
        let state = CartState::default();
        assert!(belongs_to(&state, identity(4)));
    }

    #[test]
    fn test_belongs_to_checks_store() {
        let state = CartState {
            store_id: Some(StoreId::new(4)),
            ..CartState::default()
        };
        assert!(belongs_to(&state, identity(4)));
        assert!(!belongs_to(&state, identity(5)));
    }

    #[test]
    fn test_status_identity() {
        assert_eq!(SyncStatus::Suspended.identity(), None);
        assert_eq!(SyncStatus::Loading(identity(2)).identity(), Some(identity(2)));
        assert!(SyncStatus::Ready(identity(2)).is_ready());
        assert!(!SyncStatus::Stopped.is_ready());
    }

    #[test]
    fn test_status_serializes_tagged() {
        let value = serde_json::to_value(SyncStatus::Ready(identity(3))).unwrap_or_default();
        assert_eq!(value["state"], "ready");
        assert_eq!(value["identity"]["storeId"], 3);
        let value = serde_json::to_value(SyncStatus::Suspended).unwrap_or_default();
        assert_eq!(value["state"], "suspended");
    }
}
