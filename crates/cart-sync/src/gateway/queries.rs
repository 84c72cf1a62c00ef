//! GraphQL operation definitions for the saved-cart API.

use graphql_client::GraphQLQuery;

// Scalar types for the Indimitra GraphQL schema
// Must be defined in the same module where GraphQLQuery derive is used
// Note: These MUST match the GraphQL schema scalar names exactly (uppercase)
#[allow(clippy::upper_case_acronyms)]
type JSON = serde_json::Value;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/cart.graphql",
    response_derives = "Debug, Clone"
)]
pub struct GetSavedCart;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/cart.graphql",
    response_derives = "Debug, Clone"
)]
pub struct SaveCart;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/cart.graphql",
    response_derives = "Debug, Clone"
)]
pub struct DeleteSavedCart;
