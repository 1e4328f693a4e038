//! CLI module for the brokerage entity cache
//!
//! Provides subcommands to exercise the cache against a live backend:
//! - `list`: paginated list through the cache, optionally repeated
//! - `show`: one record, always fetched
//! - `warm`: preload the first page of several entities
//! - `entities`: registered entities and their cache lifetimes

pub mod entities;
pub mod list;
pub mod show;
pub mod warm;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::state::AppState;

/// Brokerage cache - read-through entity cache for the brokerage backend
#[derive(Parser)]
#[command(name = "brokerage-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Backend base URL, overriding configuration
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List records of an entity through the cache
    List(list::ListArgs),

    /// Fetch one record (never cached)
    Show(show::ShowArgs),

    /// Preload the first page of entities into the cache
    Warm(warm::WarmArgs),

    /// Print the entity registry
    Entities,
}

/// Loads configuration, initializes logging and builds the shared state
pub(crate) async fn bootstrap(base_url: Option<&str>) -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(url) = base_url {
        config.api.base_url = url.to_string();
    }

    logging::init_logging(&config.logging)?;

    crate::create_app_state(&config).await
}

/// Pretty JSON on stdout
pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
