//! noteboard CLI - operate the note board's persistence layer directly
//!
//! Loads configuration (.env, ./noteboard.toml, environment), brings up the
//! persistence gateway, runs one operation, prints the result as JSON, and
//! shuts the gateway down again.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use noteboard_core::{GatewayConfig, GatewayError, PersistenceGateway};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "noteboard",
    author,
    version,
    about = "Post, list and move notes on the shared board",
    long_about = "Talks to the board's storage tiers in priority order: the remote document API, \
                  the primary database, then an in-process fallback store."
)]
struct Cli {
    /// Primary database URI (overrides noteboard.toml)
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every note on the board
    List,

    /// Post a new note
    Post {
        /// Note text (1-100 characters after trimming)
        text: String,

        /// `present` for a gift-style note; anything else is a plain note
        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        x: Option<f64>,

        #[arg(long)]
        y: Option<f64>,
    },

    /// Move a note to a new position
    Move {
        id: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },

    /// Show primary database liveness and fallback store size
    Status,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

fn load_config(cli: &Cli) -> GatewayConfig {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from {}", path.display());
    }
    let mut config = GatewayConfig::load();
    if let Some(url) = cli.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
        config.database_url = Some(url.to_owned());
    }
    config
}

async fn run(gateway: &PersistenceGateway, command: Commands) -> Result<serde_json::Value> {
    let value = match command {
        Commands::List => serde_json::to_value(gateway.list().await)?,
        Commands::Post { text, kind, x, y } => {
            let outcome = gateway
                .create(&text, kind.as_deref(), x, y)
                .await
                .context("Failed to post note")?;
            serde_json::to_value(outcome)?
        }
        Commands::Move { id, x, y } => {
            let outcome = gateway
                .update_position(&id, x, y)
                .await
                .context("Failed to move note")?;
            serde_json::to_value(outcome)?
        }
        Commands::Status => serde_json::to_value(gateway.debug_status().await)?,
    };
    Ok(value)
}

/// JSON body printed on stdout for failures a caller can act on.
fn error_envelope(err: &anyhow::Error) -> Option<serde_json::Value> {
    match err.downcast_ref::<GatewayError>()? {
        GatewayError::NotFound { id } => Some(
            json!({ "error": "not_found", "message": format!("note '{}' not found", id) }),
        ),
        GatewayError::Validation(e) => {
            Some(json!({ "error": "invalid_input", "message": e.to_string() }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().ok();
    let cli = Cli::parse();

    let config = load_config(&cli);
    let gateway = PersistenceGateway::init(&config).await;

    let result = run(&gateway, cli.command).await;
    gateway.shutdown().await;

    let value = match result {
        Ok(value) => value,
        Err(err) => {
            if let Some(envelope) = error_envelope(&err) {
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            }
            return Err(err);
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
