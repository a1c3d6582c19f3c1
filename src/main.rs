//! OSDU Viewer - browse OSDU records from the terminal or a local web API
//!
//! Authenticates against the platform's OAuth2 token endpoint and talks to
//! the OSDU search and storage services.

mod api;
mod auth;
mod catalog;
mod config;
mod models;
mod web;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::OsduClient;
use crate::auth::TokenManager;
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::models::FieldSelection;

#[derive(Parser)]
#[command(name = "osdu-viewer")]
#[command(about = "Browse OSDU data platform records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON web API
    Serve {
        /// Address to bind (overrides OSDU_VIEWER_HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to bind (overrides OSDU_VIEWER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Acquire a token and cache it
    Login {
        /// Discard the cached token first
        #[arg(short, long)]
        force: bool,
    },

    /// Clear the cached token
    Logout,

    /// Show current authentication status
    Status,

    /// List catalog domains and entities
    Domains,

    /// List records of a catalog entity
    Records {
        /// Domain name (from `domains` output)
        domain: String,

        /// Entity name within the domain
        entity: String,

        /// Maximum number of records to show (capped at 1000)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Number of records to skip
        #[arg(short, long, default_value = "0")]
        offset: u32,

        /// Fields to return: basic, all, or a single data field name
        #[arg(short, long, default_value = "basic")]
        fields: FieldSelection,

        /// Print the raw page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one record as JSON
    Record {
        /// Record ID
        id: String,
    },
}

/// Everything a command needs, built from the environment.
struct App {
    settings: Settings,
    tokens: Arc<TokenManager>,
    catalog: Arc<Catalog>,
    http: reqwest::Client,
}

impl App {
    fn load() -> Result<Self> {
        let settings = Settings::from_env()?;
        let http = settings
            .http_client()
            .context("Failed to build HTTP client")?;
        let tokens = Arc::new(auth::token_manager(&settings, http.clone()));
        let catalog = Arc::new(Catalog::load(settings.catalog_path.as_deref())?);
        Ok(Self {
            settings,
            tokens,
            catalog,
            http,
        })
    }

    fn client(&self) -> OsduClient {
        OsduClient::new(
            self.http.clone(),
            self.settings.base_url.clone(),
            self.settings.credentials.partition_id.clone(),
            self.tokens.clone(),
            self.catalog.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let ctx = App::load()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let mut addr: SocketAddr = ctx.settings.listen;
            if let Some(host) = host {
                addr.set_ip(host);
            }
            if let Some(port) = port {
                addr.set_port(port);
            }
            tracing::info!(
                "Serving {} (partition {})",
                ctx.settings.base_url,
                ctx.settings.credentials.partition_id
            );
            web::serve(addr, web::AppState::new(ctx.client())).await?;
        }
        Commands::Login { force } => {
            tracing::info!("Requesting token...");
            auth::login(&ctx.tokens, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&ctx.tokens).await?;
        }
        Commands::Status => {
            auth::status(&ctx.tokens).await?;
        }
        Commands::Domains => {
            api::list_domains(&ctx.catalog);
        }
        Commands::Records {
            domain,
            entity,
            limit,
            offset,
            fields,
            json,
        } => {
            let client = ctx.client();
            api::list_records(&client, &domain, &entity, limit, offset, &fields, json).await?;
        }
        Commands::Record { id } => {
            api::show_record(&ctx.client(), &id).await?;
        }
    }

    Ok(())
}
