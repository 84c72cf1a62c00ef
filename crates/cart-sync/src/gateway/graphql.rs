//! GraphQL implementation of the saved-cart gateway.
//!
//! Uses `graphql_client` for type-safe operations with `reqwest` for HTTP.

use std::sync::Arc;

use graphql_client::{GraphQLQuery, Response};
use indimitra_core::{CartSnapshot, SyncIdentity};
use tracing::{debug, instrument};

use super::queries::{
    DeleteSavedCart, GetSavedCart, SaveCart, delete_saved_cart, get_saved_cart, save_cart,
};
use super::{
    CartGateway, GatewayError, GraphQLError, GraphQLErrorLocation, RemoteCart, parse_updated_at,
};
use crate::config::ApiConfig;

/// Client for the saved-cart operations of the Indimitra GraphQL API.
#[derive(Clone)]
pub struct GraphQlCartGateway {
    inner: Arc<GraphQlCartGatewayInner>,
}

struct GraphQlCartGatewayInner {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for GraphQlCartGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlCartGateway")
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

impl GraphQlCartGateway {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(GraphQlCartGatewayInner {
                client,
                endpoint: config.graphql_url.to_string(),
                bearer_token: config.bearer_token().map(str::to_string),
            }),
        })
    }

    /// Execute a GraphQL operation.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, GatewayError>
    where
        Q::Variables: serde::Serialize,
    {
        let request_body = Q::build_query(variables);

        let mut request = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body);
        if let Some(token) = &self.inner.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(GatewayError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Saved-cart API returned non-success status"
            );
            return Err(GatewayError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                response_text.chars().take(200).collect::<String>()
            ))]));
        }

        let response: Response<Q::ResponseData> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse saved-cart GraphQL response"
                );
                return Err(GatewayError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, "GraphQL errors in response");
            return Err(GatewayError::GraphQL(
                errors.into_iter().map(convert_graphql_error).collect(),
            ));
        }

        response
            .data
            .ok_or_else(|| GatewayError::GraphQL(vec![GraphQLError::message("No data in response")]))
    }
}

fn convert_graphql_error(e: graphql_client::Error) -> GraphQLError {
    GraphQLError {
        message: e.message,
        locations: e.locations.map_or_else(Vec::new, |locs| {
            locs.into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: i64::from(l.line),
                    column: i64::from(l.column),
                })
                .collect()
        }),
        path: e.path.map_or_else(Vec::new, |p| {
            p.into_iter()
                .map(|fragment| match fragment {
                    graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                    graphql_client::PathFragment::Index(i) => serde_json::Value::Number(i.into()),
                })
                .collect()
        }),
    }
}

impl CartGateway for GraphQlCartGateway {
    #[instrument(skip(self), fields(user_id = %identity.user_id, store_id = %identity.store_id))]
    async fn get_saved_cart(
        &self,
        identity: SyncIdentity,
    ) -> Result<Option<RemoteCart>, GatewayError> {
        let variables = get_saved_cart::Variables {
            user_id: i64::from(identity.user_id),
            store_id: i64::from(identity.store_id),
        };

        let data = self.execute::<GetSavedCart>(variables).await?;

        let Some(saved) = data.get_saved_cart else {
            debug!("No saved cart on server");
            return Ok(None);
        };
        if saved.cart_data.is_null() {
            debug!(cart_id = saved.id, "Saved cart has no data");
            return Ok(None);
        }

        let snapshot: CartSnapshot = serde_json::from_value(saved.cart_data)?;
        debug!(cart_id = saved.id, items = snapshot.items.len(), "Fetched saved cart");

        Ok(Some(RemoteCart {
            snapshot,
            updated_at: parse_updated_at(&saved.updated_at),
        }))
    }

    #[instrument(skip(self, snapshot), fields(user_id = %identity.user_id, store_id = %identity.store_id))]
    async fn save_cart(
        &self,
        identity: SyncIdentity,
        snapshot: &CartSnapshot,
    ) -> Result<(), GatewayError> {
        let variables = save_cart::Variables {
            user_id: i64::from(identity.user_id),
            store_id: i64::from(identity.store_id),
            cart_data: serde_json::to_value(snapshot)?,
        };

        let data = self.execute::<SaveCart>(variables).await?;
        debug!(cart_id = data.save_cart.id, "Saved cart");

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %identity.user_id, store_id = %identity.store_id))]
    async fn delete_saved_cart(&self, identity: SyncIdentity) -> Result<bool, GatewayError> {
        let variables = delete_saved_cart::Variables {
            user_id: i64::from(identity.user_id),
            store_id: i64::from(identity.store_id),
        };

        let data = self.execute::<DeleteSavedCart>(variables).await?;
        debug!(deleted = data.delete_saved_cart, "Deleted saved cart");

        Ok(data.delete_saved_cart)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::time::Duration;

    use secrecy::SecretString;
    use url::Url;

    fn api_config() -> ApiConfig {
        ApiConfig {
            graphql_url: Url::parse("http://localhost:8000/graphql").unwrap(),
            api_token: Some(SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6")),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_gateway_debug_hides_token() {
        let gateway = GraphQlCartGateway::new(&api_config()).unwrap();
        let debug_output = format!("{gateway:?}");
        assert!(debug_output.contains("localhost:8000/graphql"));
        assert!(!debug_output.contains("aB3$xY9"));
    }

    #[test]
    fn test_get_saved_cart_variables_use_camel_case() {
        let body = GetSavedCart::build_query(get_saved_cart::Variables {
            user_id: 3,
            store_id: 11,
        });
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["operationName"], "GetSavedCart");
        assert_eq!(value["variables"]["userId"], 3);
        assert_eq!(value["variables"]["storeId"], 11);
    }

    #[test]
    fn test_save_cart_sends_snapshot_as_cart_data() {
        let mut snapshot = CartSnapshot::default();
        snapshot
            .items
            .insert("p1".into(), indimitra_core::CartLine::new(2));

        let body = SaveCart::build_query(save_cart::Variables {
            user_id: 3,
            store_id: 11,
            cart_data: serde_json::to_value(&snapshot).unwrap(),
        });
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["variables"]["cartData"]["cart"]["p1"]["quantity"], 2);
    }

    #[test]
    fn test_convert_graphql_error() {
        let raw: graphql_client::Error = serde_json::from_value(serde_json::json!({
            "message": "boom",
            "locations": [{ "line": 1, "column": 9 }],
            "path": ["getSavedCart", 0]
        }))
        .unwrap();

        let converted = convert_graphql_error(raw);
        assert_eq!(converted.message, "boom");
        assert_eq!(converted.locations.first().map(|l| l.column), Some(9));
        assert_eq!(converted.path.len(), 2);
    }
}
