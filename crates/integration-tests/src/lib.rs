//! Integration tests for Indimitra cart sync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p indimitra-integration-tests
//! ```
//!
//! The scenarios in `tests/` run a real [`CartSession`] against a
//! [`RecordingGateway`], an in-memory stand-in for the saved-cart API that
//! records every call. Tests run on Tokio's paused clock, so debounce delays
//! and slow responses cost no wall time.
//!
//! [`CartSession`]: indimitra_cart_sync::CartSession

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indimitra_cart_sync::gateway::GraphQLError;
use indimitra_cart_sync::{CartGateway, GatewayError, RemoteCart};
use indimitra_core::{CartLine, CartSnapshot, StoreId, SyncIdentity, UserId};
use serde_json::Map;

/// A call received by the [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Get(SyncIdentity),
    Save(SyncIdentity, CartSnapshot),
    Delete(SyncIdentity),
}

impl GatewayCall {
    /// Whether the call writes to the server.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Save(..) | Self::Delete(_))
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    calls: Vec<GatewayCall>,
    saved: HashMap<SyncIdentity, CartSnapshot>,
    fail_fetches: bool,
    fail_writes: bool,
    fetch_delay: Duration,
    write_delay: Duration,
}

/// In-memory saved-cart API that records calls.
///
/// Clones share state, so a test can keep one handle while the session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl RecordingGateway {
    /// A gateway with nothing saved.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a saved cart on the server.
    pub fn set_saved(&self, identity: SyncIdentity, snapshot: CartSnapshot) {
        self.lock().saved.insert(identity, snapshot);
    }

    /// The cart currently saved for `identity`.
    #[must_use]
    pub fn saved(&self, identity: SyncIdentity) -> Option<CartSnapshot> {
        self.lock().saved.get(&identity).cloned()
    }

    /// Make every fetch fail.
    pub fn fail_fetches(&self, fail: bool) {
        self.lock().fail_fetches = fail;
    }

    /// Make every save and delete fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Delay every fetch response.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = delay;
    }

    /// Delay every save and delete response.
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = delay;
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Identities fetched so far.
    #[must_use]
    pub fn fetches(&self) -> Vec<SyncIdentity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Get(identity) => Some(identity),
                _ => None,
            })
            .collect()
    }

    /// Saves and deletes received so far.
    #[must_use]
    pub fn writes(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(GatewayCall::is_write)
            .collect()
    }

    fn record(&self, call: GatewayCall) -> (bool, Duration) {
        let mut state = self.lock();
        state.calls.push(call);
        match state.calls.last() {
            Some(GatewayCall::Get(_)) => (state.fail_fetches, state.fetch_delay),
            _ => (state.fail_writes, state.write_delay),
        }
    }
}

fn injected_failure() -> GatewayError {
    GatewayError::GraphQL(vec![GraphQLError::message("injected failure")])
}

impl CartGateway for RecordingGateway {
    async fn get_saved_cart(
        &self,
        identity: SyncIdentity,
    ) -> Result<Option<RemoteCart>, GatewayError> {
        let (fail, delay) = self.record(GatewayCall::Get(identity));
        tokio::time::sleep(delay).await;
        if fail {
            return Err(injected_failure());
        }
        Ok(self.saved(identity).map(RemoteCart::new))
    }

    async fn save_cart(
        &self,
        identity: SyncIdentity,
        snapshot: &CartSnapshot,
    ) -> Result<(), GatewayError> {
        let (fail, delay) = self.record(GatewayCall::Save(identity, snapshot.clone()));
        tokio::time::sleep(delay).await;
        if fail {
            return Err(injected_failure());
        }
        self.set_saved(identity, snapshot.clone());
        Ok(())
    }

    async fn delete_saved_cart(&self, identity: SyncIdentity) -> Result<bool, GatewayError> {
        let (fail, delay) = self.record(GatewayCall::Delete(identity));
        tokio::time::sleep(delay).await;
        if fail {
            return Err(injected_failure());
        }
        Ok(self.lock().saved.remove(&identity).is_some())
    }
}

/// Identity for `user` at `store`.
#[must_use]
pub const fn identity(user: i32, store: i32) -> SyncIdentity {
    SyncIdentity::new(UserId::new(user), StoreId::new(store))
}

/// A snapshot holding the given product lines.
#[must_use]
pub fn cart_with(lines: &[(&str, u32)]) -> CartSnapshot {
    let mut snapshot = CartSnapshot::default();
    for &(product, quantity) in lines {
        snapshot.items.insert(product.into(), CartLine::new(quantity));
    }
    snapshot
}

/// Empty product details.
#[must_use]
pub fn no_details() -> Map<String, serde_json::Value> {
    Map::new()
}
