//! Indimitra CLI - saved-cart and cart sync tools.
//!
//! # Usage
//!
//! ```bash
//! # Print the cart saved on the server for user 17 at store 4
//! indimitra cart show --user 17 --store 4
//!
//! # Save a snapshot from a JSON file
//! indimitra cart push --user 17 --store 4 --file cart.json
//!
//! # Delete the saved cart
//! indimitra cart delete --user 17 --store 4
//!
//! # Print the local snapshot for store 4
//! indimitra cache show --store 4
//!
//! # Run a live sync session driven by commands on stdin
//! indimitra session --user 17 --store 4
//! ```
//!
//! Configuration comes from the environment (see `indimitra_cart_sync::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indimitra_cart_sync::SyncConfig;
use indimitra_core::{StoreId, SyncIdentity, UserId};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "indimitra")]
#[command(author, version, about = "Indimitra cart sync tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit carts saved on the server
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect local cart snapshots
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run a live cart sync session driven by stdin commands
    Session {
        /// Signed-in user ID (omit to start signed out)
        #[arg(short, long)]
        user: Option<UserId>,

        /// Selected store ID
        #[arg(short, long)]
        store: Option<StoreId>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the saved cart
    Show {
        #[arg(short, long)]
        user: UserId,
        #[arg(short, long)]
        store: StoreId,
    },
    /// Save a cart snapshot read from a JSON file
    Push {
        #[arg(short, long)]
        user: UserId,
        #[arg(short, long)]
        store: StoreId,
        /// Path to the snapshot JSON
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete the saved cart
    Delete {
        #[arg(short, long)]
        user: UserId,
        #[arg(short, long)]
        store: StoreId,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the local snapshot for a store
    Show {
        #[arg(short, long)]
        store: StoreId,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Failed to load configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "indimitra_cart_sync=info,indimitra_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show { user, store } => {
                commands::cart::show(config, SyncIdentity::new(user, store)).await?;
            }
            CartAction::Push { user, store, file } => {
                commands::cart::push(config, SyncIdentity::new(user, store), &file).await?;
            }
            CartAction::Delete { user, store } => {
                commands::cart::delete(config, SyncIdentity::new(user, store)).await?;
            }
        },
        Commands::Cache { action } => match action {
            CacheAction::Show { store } => commands::cache::show(config, store).await?,
        },
        Commands::Session { user, store } => commands::session::run(config, user, store).await?,
    }
    Ok(())
}
