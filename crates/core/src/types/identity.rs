//! Sync identities.
//!
//! A saved cart is scoped to one shopper at one store. The session may know
//! neither, one, or both halves of that pair at any moment (signed out, no
//! store picked yet, ...); synchronization only runs when both are known.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::{StoreId, UserId};

/// The `(user, store)` pair a saved cart belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIdentity {
    /// Signed-in shopper.
    pub user_id: UserId,
    /// Store the cart is for.
    pub store_id: StoreId,
}

impl SyncIdentity {
    /// Create a sync identity.
    #[must_use]
    pub const fn new(user_id: UserId, store_id: StoreId) -> Self {
        Self { user_id, store_id }
    }
}

impl fmt::Display for SyncIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {} @ store {}", self.user_id, self.store_id)
    }
}

/// What the session currently knows about the shopper and store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    /// Signed-in shopper, if any.
    pub user_id: Option<UserId>,
    /// Selected store, if any.
    pub store_id: Option<StoreId>,
}

impl SessionIdentity {
    /// Create a session identity.
    #[must_use]
    pub const fn new(user_id: Option<UserId>, store_id: Option<StoreId>) -> Self {
        Self { user_id, store_id }
    }

    /// The sync identity, when both halves are known.
    #[must_use]
    pub const fn sync_identity(&self) -> Option<SyncIdentity> {
        match (self.user_id, self.store_id) {
            (Some(user_id), Some(store_id)) => Some(SyncIdentity::new(user_id, store_id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_identity_requires_both_halves() {
        let user = Some(UserId::new(1));
        let store = Some(StoreId::new(2));

        assert_eq!(SessionIdentity::default().sync_identity(), None);
        assert_eq!(SessionIdentity::new(user, None).sync_identity(), None);
        assert_eq!(SessionIdentity::new(None, store).sync_identity(), None);
        assert_eq!(
            SessionIdentity::new(user, store).sync_identity(),
            Some(SyncIdentity::new(UserId::new(1), StoreId::new(2)))
        );
    }

    #[test]
    fn test_sync_identity_display() {
        let identity = SyncIdentity::new(UserId::new(5), StoreId::new(9));
        assert_eq!(identity.to_string(), "user 5 @ store 9");
    }
}
