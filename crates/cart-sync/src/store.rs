//! Reactive cart state store.
//!
//! [`CartStore`] owns the authoritative in-memory cart. UI actions mutate it
//! through the methods below; every mutation publishes a [`CartChange`]
//! carrying the previous and current state on a broadcast channel, so
//! consumers (the sync coordinator, views) react to transitions instead of
//! polling.
//!
//! Each change carries a monotonically increasing revision. Consumers use it
//! to discard events that were emitted before some point they care about.

use std::sync::Arc;

use indimitra_core::{
    CartLine, CartSnapshot, DeliveryType, PickupAddress, ProductKey, StoreId,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Full state held by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartState {
    /// Store the cart contents belong to.
    pub store_id: Option<StoreId>,
    /// Cart-relevant state.
    pub snapshot: CartSnapshot,
    /// Whether the cart drawer is open. UI-only, never synchronized.
    pub drawer_open: bool,
}

impl CartState {
    /// Whether any synchronized cart field differs from `previous`.
    ///
    /// UI-only fields such as `drawer_open` are ignored.
    #[must_use]
    pub fn cart_changed(&self, previous: &Self) -> bool {
        let (now, before) = (&self.snapshot, &previous.snapshot);
        now.items != before.items
            || now.custom_order != before.custom_order
            || now.list_input_answers != before.list_input_answers
            || now.delivery_type != before.delivery_type
            || now.tip_amount != before.tip_amount
            || now.pickup_address != before.pickup_address
    }
}

/// A state transition published by the store.
#[derive(Debug, Clone)]
pub struct CartChange {
    /// Revision of `current`.
    pub revision: u64,
    /// State before the mutation.
    pub previous: Arc<CartState>,
    /// State after the mutation.
    pub current: Arc<CartState>,
}

impl CartChange {
    /// Whether the transition touched synchronized cart fields.
    #[must_use]
    pub fn cart_changed(&self) -> bool {
        self.current.cart_changed(&self.previous)
    }
}

#[derive(Debug, Clone, Default)]
struct Versioned {
    revision: u64,
    state: Arc<CartState>,
}

/// Shared handle to the cart store.
///
/// Cheaply cloneable; all clones observe and mutate the same state.
#[derive(Debug, Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

#[derive(Debug)]
struct CartStoreInner {
    state: watch::Sender<Versioned>,
    events: broadcast::Sender<CartChange>,
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty store buffering up to `capacity` change events per
    /// subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (state, _) = watch::channel(Versioned::default());
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(CartStoreInner { state, events }),
        }
    }

    /// Subscribe to state transitions published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartChange> {
        self.inner.events.subscribe()
    }

    /// Current full state.
    #[must_use]
    pub fn state(&self) -> Arc<CartState> {
        Arc::clone(&self.inner.state.borrow().state)
    }

    /// Revision of the current state.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.state.borrow().revision
    }

    /// Snapshot of the cart-relevant state.
    #[must_use]
    pub fn get_cart_state(&self) -> CartSnapshot {
        self.inner.state.borrow().state.snapshot.clone()
    }

    /// Replace the cart contents with a saved snapshot.
    pub fn restore_cart(&self, snapshot: CartSnapshot) {
        self.update(|state| state.snapshot = snapshot);
    }

    /// Restore a saved snapshot only if `accept` approves the current state.
    ///
    /// The check and the restore happen under the same lock, so no mutation
    /// can slip in between them. Returns whether the snapshot was restored.
    pub fn restore_cart_if(
        &self,
        snapshot: CartSnapshot,
        accept: impl FnOnce(&CartState) -> bool,
    ) -> bool {
        self.publish(|state| {
            if !accept(state) {
                return false;
            }
            state.snapshot = snapshot;
            true
        })
    }

    /// Point the store at another store's cart in one transition.
    ///
    /// Returns the state that was replaced, so the outgoing cart can be
    /// persisted without racing later mutations.
    pub fn switch_store(&self, store_id: Option<StoreId>, snapshot: CartSnapshot) -> CartState {
        let mut outgoing = CartState::default();
        self.update(|state| {
            outgoing = state.clone();
            state.store_id = store_id;
            state.snapshot = snapshot;
        });
        outgoing
    }

    /// Add one unit of a product, creating the line if needed.
    ///
    /// `details` replace the line's stored product details when non-empty.
    pub fn add_item(&self, product: impl Into<ProductKey>, details: Map<String, Value>) {
        let product = product.into();
        self.update(|state| {
            let line = state.snapshot.items.entry(product).or_default();
            line.quantity = line.quantity.saturating_add(1);
            if !details.is_empty() {
                line.details = details;
            }
        });
    }

    /// Set a product's quantity; zero removes the line.
    pub fn set_quantity(&self, product: impl Into<ProductKey>, quantity: u32) {
        let product = product.into();
        self.update(|state| {
            if quantity == 0 {
                state.snapshot.items.remove(&product);
            } else {
                state
                    .snapshot
                    .items
                    .entry(product)
                    .or_insert_with(|| CartLine::new(0))
                    .quantity = quantity;
            }
        });
    }

    /// Remove one unit of a product, dropping the line when it reaches zero.
    pub fn remove_item(&self, product: &ProductKey) {
        self.update(|state| {
            let Some(line) = state.snapshot.items.get_mut(product) else {
                return;
            };
            if line.quantity <= 1 {
                state.snapshot.items.remove(product);
            } else {
                line.quantity -= 1;
            }
        });
    }

    /// Empty the cart after an order is placed.
    ///
    /// Product lines, the custom order and list answers are cleared;
    /// checkout preferences are kept for the next order.
    pub fn clear_cart(&self) {
        self.update(|state| {
            state.snapshot.items.clear();
            state.snapshot.custom_order = None;
            state.snapshot.list_input_answers.clear();
        });
    }

    /// Set or clear the custom order text.
    pub fn set_custom_order(&self, custom_order: Option<String>) {
        self.update(|state| state.snapshot.custom_order = custom_order);
    }

    /// Record the answer to a list prompt.
    pub fn set_list_input_answer(&self, prompt: impl Into<String>, answer: Value) {
        let prompt = prompt.into();
        self.update(|state| {
            state.snapshot.list_input_answers.insert(prompt, answer);
        });
    }

    /// Remove the answer to a list prompt.
    pub fn remove_list_input_answer(&self, prompt: &str) {
        self.update(|state| {
            state.snapshot.list_input_answers.remove(prompt);
        });
    }

    /// Choose pickup or delivery.
    pub fn set_delivery_type(&self, delivery_type: Option<DeliveryType>) {
        self.update(|state| state.snapshot.delivery_type = delivery_type);
    }

    /// Set the tip.
    pub fn set_tip_amount(&self, tip_amount: Option<Decimal>) {
        self.update(|state| state.snapshot.tip_amount = tip_amount);
    }

    /// Choose a pickup address.
    pub fn set_pickup_address(&self, pickup_address: Option<PickupAddress>) {
        self.update(|state| state.snapshot.pickup_address = pickup_address);
    }

    /// Open or close the cart drawer.
    pub fn set_drawer_open(&self, open: bool) {
        self.update(|state| state.drawer_open = open);
    }

    /// Apply a mutation and publish the transition.
    fn update(&self, mutate: impl FnOnce(&mut CartState)) {
        self.publish(|state| {
            mutate(state);
            true
        });
    }

    /// Apply a mutation that may decline, publishing the transition if it
    /// went ahead.
    ///
    /// The event is sent while the state lock is held so subscribers see
    /// transitions in revision order.
    fn publish(&self, mutate: impl FnOnce(&mut CartState) -> bool) -> bool {
        let events = &self.inner.events;
        self.inner.state.send_if_modified(|versioned| {
            let previous = Arc::clone(&versioned.state);
            let mut next = (*previous).clone();
            if !mutate(&mut next) {
                return false;
            }

            versioned.revision += 1;
            versioned.state = Arc::new(next);

            // No subscribers is fine
            let _ = events.send(CartChange {
                revision: versioned.revision,
                previous,
                current: Arc::clone(&versioned.state),
            });
            true
        })
    }
}
