//! Interactive cart sync session.
//!
//! Starts a [`CartSession`] and applies one command per stdin line, so the
//! sync behavior can be exercised against a real API:
//!
//! ```text
//! add <product> [details-json]   add one unit
//! remove <product>               remove one unit
//! custom [text]                  set (or clear) the custom order
//! answer <prompt> [value]        answer (or clear) a list prompt
//! delivery pickup|delivery|none  choose the delivery type
//! tip <amount>|none              set the tip
//! pickup <address-json>|none     choose the pickup address
//! clear                          empty the cart
//! store <id>|none                switch store
//! login <user-id>                sign in
//! logout                         sign out
//! show                           print the cart and sync status
//! quit                           wait for pending saves and exit
//! ```

use std::str::FromStr;

use indimitra_cart_sync::{CartSession, GraphQlCartGateway, SnapshotCacheBackend, SyncConfig};
use indimitra_core::{DeliveryType, PickupAddress, ProductKey, StoreId, UserId};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CommandError, print_json};

/// A parsed session command.
#[derive(Debug, Clone, PartialEq)]
enum SessionCommand {
    Add(ProductKey, Map<String, Value>),
    Remove(ProductKey),
    Custom(Option<String>),
    Answer(String, Option<Value>),
    Delivery(Option<DeliveryType>),
    Tip(Option<Decimal>),
    Pickup(Option<PickupAddress>),
    Clear,
    Store(Option<StoreId>),
    Login(UserId),
    Logout,
    Show,
    Quit,
}

/// A line that is not a valid session command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
struct ParseCommandError(String);

fn usage(message: &str) -> ParseCommandError {
    ParseCommandError(message.to_string())
}

/// Parse a value that may be `none`.
fn optional<T>(
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, ParseCommandError>,
) -> Result<Option<T>, ParseCommandError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse(raw).map(Some)
    }
}

/// Parse JSON, falling back to a plain string value.
fn json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl FromStr for SessionCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match command.to_ascii_lowercase().as_str() {
            "add" => {
                let (product, details) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if product.is_empty() {
                    return Err(usage("usage: add <product> [details-json]"));
                }
                let details = match details.trim() {
                    "" => Map::new(),
                    raw => match serde_json::from_str(raw) {
                        Ok(Value::Object(map)) => map,
                        _ => return Err(usage("product details must be a JSON object")),
                    },
                };
                Ok(Self::Add(product.into(), details))
            }
            "remove" if !rest.is_empty() => Ok(Self::Remove(rest.into())),
            "remove" => Err(usage("usage: remove <product>")),
            "custom" => Ok(Self::Custom((!rest.is_empty()).then(|| rest.to_string()))),
            "answer" => {
                let (prompt, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if prompt.is_empty() {
                    return Err(usage("usage: answer <prompt> [value]"));
                }
                let value = value.trim();
                Ok(Self::Answer(
                    prompt.to_string(),
                    (!value.is_empty()).then(|| json_or_string(value)),
                ))
            }
            "delivery" => optional(rest, |raw| {
                raw.parse::<DeliveryType>()
                    .map_err(|e| ParseCommandError(e.to_string()))
            })
            .map(Self::Delivery),
            "tip" => optional(rest, |raw| {
                raw.parse::<Decimal>()
                    .map_err(|e| ParseCommandError(format!("invalid tip amount: {e}")))
            })
            .map(Self::Tip),
            "pickup" => optional(rest, |raw| match serde_json::from_str(raw) {
                Ok(Value::Object(fields)) => Ok(PickupAddress::new(fields)),
                _ => Err(usage("pickup address must be a JSON object")),
            })
            .map(Self::Pickup),
            "clear" => Ok(Self::Clear),
            "store" => optional(rest, |raw| {
                raw.parse::<StoreId>()
                    .map_err(|e| ParseCommandError(format!("invalid store ID: {e}")))
            })
            .map(Self::Store),
            "login" => rest
                .parse::<UserId>()
                .map(Self::Login)
                .map_err(|e| ParseCommandError(format!("invalid user ID: {e}"))),
            "logout" => Ok(Self::Logout),
            "show" => Ok(Self::Show),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseCommandError(format!("unknown command '{other}'"))),
        }
    }
}

/// Run a session until `quit` or end of input.
pub async fn run(
    config: &SyncConfig,
    user: Option<UserId>,
    store: Option<StoreId>,
) -> Result<(), CommandError> {
    let gateway = GraphQlCartGateway::new(&config.api)?;
    let cache = SnapshotCacheBackend::from_dir(config.cache_dir.as_deref());
    let session = CartSession::start(gateway, cache, &config.settings);

    session.select_store(store).await;
    if let Some(user) = user {
        session.sign_in(user);
    }
    tracing::info!(identity = ?session.identity(), "Session started; type commands, 'quit' to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("{e}");
                continue;
            }
        };
        if command == SessionCommand::Quit {
            break;
        }
        apply(&session, command).await?;
    }

    // Let a pending debounced save go out before stopping
    tokio::time::sleep(config.settings.debounce).await;
    session.shutdown().await;
    Ok(())
}

async fn apply(
    session: &CartSession<SnapshotCacheBackend>,
    command: SessionCommand,
) -> Result<(), CommandError> {
    let store = session.store();
    match command {
        SessionCommand::Add(product, details) => store.add_item(product, details),
        SessionCommand::Remove(product) => store.remove_item(&product),
        SessionCommand::Custom(text) => store.set_custom_order(text),
        SessionCommand::Answer(prompt, Some(value)) => store.set_list_input_answer(prompt, value),
        SessionCommand::Answer(prompt, None) => store.remove_list_input_answer(&prompt),
        SessionCommand::Delivery(delivery_type) => store.set_delivery_type(delivery_type),
        SessionCommand::Tip(amount) => store.set_tip_amount(amount),
        SessionCommand::Pickup(address) => store.set_pickup_address(address),
        SessionCommand::Clear => store.clear_cart(),
        SessionCommand::Store(store_id) => session.select_store(store_id).await,
        SessionCommand::Login(user_id) => session.sign_in(user_id),
        SessionCommand::Logout => session.sign_out(),
        SessionCommand::Show => {
            let state = store.state();
            print_json(&json!({
                "status": session.status(),
                "storeId": state.store_id,
                "empty": state.snapshot.is_empty(),
                "cart": state.snapshot,
            }))?;
        }
        SessionCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(line: &str) -> SessionCommand {
        line.parse().unwrap()
    }

    #[test]
    fn test_parse_add() {
        assert_eq!(parse("add p1"), SessionCommand::Add("p1".into(), Map::new()));

        let SessionCommand::Add(product, details) = parse(r#"add p2 {"name": "Ghee"}"#) else {
            panic!("expected add");
        };
        assert_eq!(product.as_str(), "p2");
        assert_eq!(details.get("name"), Some(&json!("Ghee")));

        assert!("add".parse::<SessionCommand>().is_err());
        assert!("add p1 [1, 2]".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_parse_custom_and_answer() {
        assert_eq!(
            parse("custom 2 bunches of methi"),
            SessionCommand::Custom(Some("2 bunches of methi".to_string()))
        );
        assert_eq!(parse("custom"), SessionCommand::Custom(None));
        assert_eq!(
            parse("answer weekly yes"),
            SessionCommand::Answer("weekly".to_string(), Some(json!("yes")))
        );
        assert_eq!(
            parse("answer count 3"),
            SessionCommand::Answer("count".to_string(), Some(json!(3)))
        );
        assert_eq!(
            parse("answer weekly"),
            SessionCommand::Answer("weekly".to_string(), None)
        );
    }

    #[test]
    fn test_parse_optional_values() {
        assert_eq!(
            parse("delivery pickup"),
            SessionCommand::Delivery(Some(DeliveryType::Pickup))
        );
        assert_eq!(parse("delivery none"), SessionCommand::Delivery(None));
        assert_eq!(
            parse("tip 2.50"),
            SessionCommand::Tip(Some(Decimal::new(250, 2)))
        );
        assert_eq!(parse("store none"), SessionCommand::Store(None));
        assert_eq!(
            parse("store 4"),
            SessionCommand::Store(Some(StoreId::new(4)))
        );
        assert!("delivery teleport".parse::<SessionCommand>().is_err());
        assert!("tip lots".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_parse_pickup() {
        let SessionCommand::Pickup(Some(address)) = parse(r#"pickup {"id": 9}"#) else {
            panic!("expected pickup address");
        };
        assert_eq!(address.id(), Some(&json!(9)));
        assert_eq!(parse("pickup none"), SessionCommand::Pickup(None));
        assert!("pickup 9".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(parse("login 17"), SessionCommand::Login(UserId::new(17)));
        assert_eq!(parse("LOGOUT"), SessionCommand::Logout);
        assert_eq!(parse("  show  "), SessionCommand::Show);
        assert_eq!(parse("exit"), SessionCommand::Quit);
        assert!("login".parse::<SessionCommand>().is_err());

        let err = "dance".parse::<SessionCommand>().unwrap_err();
        assert_eq!(err.to_string(), "unknown command 'dance'");
    }
}
