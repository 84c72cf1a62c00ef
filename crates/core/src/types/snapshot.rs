//! Cart snapshot - the unit of cart synchronization.
//!
//! A [`CartSnapshot`] is a serializable point-in-time copy of everything the
//! shopper has put into the cart for one store: product lines, a free-form
//! custom order, answers to the store's list prompts, and checkout
//! preferences. It is stored verbatim as the `cartData` JSON of a saved cart
//! and as the per-store local snapshot, so the field names follow the web
//! client's JSON shape (`cart`, `customOrder`, `listInputAnswers`, ...).
//!
//! # Emptiness
//!
//! A snapshot is empty when it holds no product lines, no custom order and
//! no list answers. Checkout preferences (`deliveryType`, `tipAmount`,
//! `pickupAddress`) never make a cart non-empty: a shopper who only picked
//! "pickup" has nothing worth saving server-side.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Product Lines
// =============================================================================

/// Product identifier used as the key of a cart line.
///
/// The web client keys lines by the product's ID as a JSON object key, so
/// this is kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(String);

impl ProductKey {
    /// Create a product key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ProductKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for ProductKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A single product line in the cart.
///
/// Only `quantity` is interpreted; any other product details the UI stored
/// with the line (name, price, image) are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Number of units in the cart.
    #[serde(default)]
    pub quantity: u32,
    /// Product details stored alongside the quantity.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl CartLine {
    /// Create a line with the given quantity and no extra details.
    #[must_use]
    pub fn new(quantity: u32) -> Self {
        Self {
            quantity,
            details: Map::new(),
        }
    }

    /// Create a line with product details.
    #[must_use]
    pub const fn with_details(quantity: u32, details: Map<String, Value>) -> Self {
        Self { quantity, details }
    }
}

/// Product lines keyed by product.
pub type CartItems = BTreeMap<ProductKey, CartLine>;

/// Answers to a store's list prompts, keyed by prompt identifier.
pub type ListInputAnswers = BTreeMap<String, Value>;

// =============================================================================
// Checkout Preferences
// =============================================================================

/// How the order reaches the shopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    /// Shopper collects the order at one of the store's pickup addresses.
    Pickup,
    /// Order is delivered to the shopper's address.
    Delivery,
}

/// Error parsing a [`DeliveryType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delivery type '{0}' (expected 'pickup' or 'delivery')")]
pub struct DeliveryTypeError(String);

impl FromStr for DeliveryType {
    type Err = DeliveryTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pickup" => Ok(Self::Pickup),
            "delivery" => Ok(Self::Delivery),
            other => Err(DeliveryTypeError(other.to_string())),
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pickup => f.write_str("pickup"),
            Self::Delivery => f.write_str("delivery"),
        }
    }
}

/// A store pickup address as selected in the checkout form.
///
/// Kept as the raw object the store API returned; only `id` is looked at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickupAddress(Map<String, Value>);

impl PickupAddress {
    /// Wrap a pickup address object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The address ID, if present.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// All fields of the address.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

// =============================================================================
// CartSnapshot
// =============================================================================

/// Deserialize a collection, reading JSON `null` as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Serializable copy of the cart-relevant state for one store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Product lines.
    #[serde(
        rename = "cart",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub items: CartItems,
    /// Free-form order text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_order: Option<String>,
    /// Answers to the store's list prompts.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub list_input_answers: ListInputAnswers,
    /// Pickup or delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<DeliveryType>,
    /// Tip added at checkout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub tip_amount: Option<Decimal>,
    /// Selected pickup address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<PickupAddress>,
}

impl CartSnapshot {
    /// Whether the snapshot holds anything worth persisting.
    ///
    /// True iff there are no product lines, no (non-blank) custom order and
    /// no list answers. Checkout preferences are ignored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && !self.has_custom_order() && self.list_input_answers.is_empty()
    }

    /// Whether a custom order is present. An empty string counts as absent.
    #[must_use]
    pub fn has_custom_order(&self) -> bool {
        self.custom_order.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Total units across all product lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.values().map(|line| u64::from(line.quantity)).sum()
    }
}

/// Emptiness predicate over an optional snapshot.
///
/// A missing snapshot is empty.
#[must_use]
pub fn is_cart_empty(snapshot: Option<&CartSnapshot>) -> bool {
    snapshot.is_none_or(CartSnapshot::is_empty)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use serde_json::json;

    fn with_item(key: &str, quantity: u32) -> CartSnapshot {
        let mut snapshot = CartSnapshot::default();
        snapshot.items.insert(key.into(), CartLine::new(quantity));
        snapshot
    }

    #[test]
    fn test_default_snapshot_is_empty() {
        assert!(CartSnapshot::default().is_empty());
        assert!(is_cart_empty(None));
        assert!(is_cart_empty(Some(&CartSnapshot::default())));
    }

    #[test]
    fn test_items_make_snapshot_non_empty() {
        assert!(!with_item("p1", 1).is_empty());
    }

    #[test]
    fn test_custom_order_makes_snapshot_non_empty() {
        let snapshot = CartSnapshot {
            custom_order: Some("2kg basmati rice".to_string()),
            ..CartSnapshot::default()
        };
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_blank_custom_order_counts_as_absent() {
        let snapshot = CartSnapshot {
            custom_order: Some(String::new()),
            ..CartSnapshot::default()
        };
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_list_answers_make_snapshot_non_empty() {
        let mut snapshot = CartSnapshot::default();
        snapshot
            .list_input_answers
            .insert("weekly-list".to_string(), json!("milk, eggs"));
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_checkout_preferences_do_not_affect_emptiness() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(3));
        let snapshot = CartSnapshot {
            delivery_type: Some(DeliveryType::Pickup),
            tip_amount: Some(Decimal::new(250, 2)),
            pickup_address: Some(PickupAddress::new(fields)),
            ..CartSnapshot::default()
        };
        assert!(snapshot.is_empty());

        let mut non_empty = with_item("p1", 1);
        non_empty.delivery_type = snapshot.delivery_type;
        non_empty.tip_amount = snapshot.tip_amount;
        assert!(!non_empty.is_empty());
    }

    #[test]
    fn test_serializes_web_client_shape() {
        let mut snapshot = with_item("p1", 2);
        snapshot.delivery_type = Some(DeliveryType::Delivery);
        snapshot.tip_amount = Some(Decimal::new(5, 0));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({
                "cart": { "p1": { "quantity": 2 } },
                "deliveryType": "delivery",
                "tipAmount": 5.0
            })
        );
    }

    #[test]
    fn test_deserializes_web_client_payload() {
        let payload = json!({
            "cart": {
                "17": { "id": 17, "name": "Toor Dal", "price": 4.99, "quantity": 3 }
            },
            "customOrder": "",
            "listInputAnswers": {},
            "deliveryType": "pickup",
            "tipAmount": 0,
            "pickupAddress": { "id": "9", "address": "12 Main St" }
        });

        let snapshot: CartSnapshot = serde_json::from_value(payload).unwrap();
        let line = snapshot.items.get("17").unwrap();
        assert_eq!(line.quantity, 3);
        assert_eq!(line.details.get("name"), Some(&json!("Toor Dal")));
        assert_eq!(snapshot.delivery_type, Some(DeliveryType::Pickup));
        assert_eq!(snapshot.tip_amount, Some(Decimal::ZERO));
        assert_eq!(
            snapshot.pickup_address.as_ref().and_then(PickupAddress::id),
            Some(&json!("9"))
        );
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_deserializes_empty_object() {
        let snapshot: CartSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(snapshot, CartSnapshot::default());
    }

    #[test]
    fn test_deserializes_null_fields_as_absent() {
        let snapshot: CartSnapshot = serde_json::from_value(json!({
            "cart": null,
            "customOrder": null,
            "listInputAnswers": null,
            "deliveryType": null,
            "tipAmount": null,
            "pickupAddress": null,
        }))
        .unwrap();
        assert_eq!(snapshot, CartSnapshot::default());
        assert!(snapshot.is_empty());

        let snapshot: CartSnapshot =
            serde_json::from_value(json!({"cart": null, "customOrder": "2 bunches of methi"}))
                .unwrap();
        assert!(snapshot.items.is_empty());
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_item_count() {
        let mut snapshot = with_item("p1", 2);
        snapshot.items.insert("p2".into(), CartLine::new(3));
        assert_eq!(snapshot.item_count(), 5);
    }

    #[test]
    fn test_delivery_type_parse() {
        assert_eq!("Pickup".parse::<DeliveryType>().unwrap(), DeliveryType::Pickup);
        assert_eq!(
            "delivery".parse::<DeliveryType>().unwrap(),
            DeliveryType::Delivery
        );
        assert!("drone".parse::<DeliveryType>().is_err());
    }
}
