//! Remote cart gateway - the saved-cart operations of the Indimitra API.
//!
//! # Architecture
//!
//! - [`CartGateway`] is the seam the coordinator talks to: fetch, save and
//!   delete of the cart saved for one `(user, store)` pair
//! - [`GraphQlCartGateway`] implements it over the GraphQL API using
//!   `graphql_client` for type-safe operations and `reqwest` for HTTP
//! - The server is the only place saved carts live; there is no caching in
//!   front of the gateway (saved carts are mutable state)
//!
//! # Example
//!
//! ```rust,ignore
//! use indimitra_cart_sync::gateway::{CartGateway, GraphQlCartGateway};
//!
//! let gateway = GraphQlCartGateway::new(&config.api)?;
//! let identity = SyncIdentity::new(UserId::new(1), StoreId::new(4));
//!
//! if let Some(saved) = gateway.get_saved_cart(identity).await? {
//!     println!("{} items", saved.snapshot.item_count());
//! }
//! ```

mod graphql;
pub mod queries;

use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use indimitra_core::{CartSnapshot, SyncIdentity};
use thiserror::Error;

pub use graphql::GraphQlCartGateway;

/// Errors that can occur when talking to the saved-cart API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL operation returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// A GraphQL error returned by the API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the operation.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// An error carrying only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: vec![],
            path: vec![],
        }
    }
}

/// Location in a GraphQL operation where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// A cart as saved on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCart {
    /// The saved snapshot.
    pub snapshot: CartSnapshot,
    /// When the server last wrote it, if reported.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteCart {
    /// A remote cart without a timestamp.
    #[must_use]
    pub const fn new(snapshot: CartSnapshot) -> Self {
        Self {
            snapshot,
            updated_at: None,
        }
    }
}

/// Saved-cart operations, all scoped to one `(user, store)` pair.
///
/// Implementations must be cheap to share across tasks; the coordinator
/// holds one behind an `Arc` and calls it from spawned tasks.
pub trait CartGateway: Send + Sync + 'static {
    /// Fetch the saved cart, or `None` when nothing is stored.
    fn get_saved_cart(
        &self,
        identity: SyncIdentity,
    ) -> impl Future<Output = Result<Option<RemoteCart>, GatewayError>> + Send;

    /// Create or replace the saved cart.
    fn save_cart(
        &self,
        identity: SyncIdentity,
        snapshot: &CartSnapshot,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Delete the saved cart. Returns `false` when nothing was stored.
    fn delete_saved_cart(
        &self,
        identity: SyncIdentity,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;
}

/// Parse the server's `updatedAt`.
///
/// The API reports naive UTC ISO-8601 timestamps (no offset); RFC 3339 with
/// an offset is accepted too. Empty or unparseable values yield `None`.
pub(crate) fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
