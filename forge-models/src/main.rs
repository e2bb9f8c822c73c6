//! forge-models - 3D asset generation service
//!
//! Submits text and image jobs to Meshy, Tripo, Rodin and Replicate, tracks
//! them in SQLite, copies finished models into local storage and converts
//! between GLB, FBX and OBJ with assimp.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forge_common::config::{CliOverrides, Credential};
use forge_common::Config;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge_models::providers::ProviderRegistry;
use forge_models::services::{
    AssimpConverter, HttpFetcher, Orchestrator, PromptEnhancer, RobloxPublisher,
};
use forge_models::{build_router, AppState};

/// Timeout for the shared client used by prompt enhancement and publishing
const SERVICE_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Command-line arguments for forge-models
#[derive(Parser, Debug)]
#[command(name = "forge-models")]
#[command(about = "3D asset generation and conversion service")]
#[command(version)]
struct Args {
    /// Port to listen on (replaces the port of the configured bind address)
    #[arg(short, long, env = "FORGE_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and generated assets
    #[arg(short, long, env = "FORGE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML override file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&CliOverrides {
        root_folder: args.root_folder,
        port: args.port,
        config_file: args.config,
    })
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting forge-models v{}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to create root folder layout")?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let db = forge_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    for credential in Credential::ALL {
        if config.credentials.get(credential).is_none() {
            warn!("{} not set; dependent endpoints will fail", credential.env_var());
        }
    }

    let providers = ProviderRegistry::from_credentials(&config.credentials)
        .context("Failed to create provider adapters")?;

    let converter = AssimpConverter::new(&config.converter);
    if !converter.check_available().await {
        warn!(
            binary = %config.converter.binary,
            "assimp not found; FBX/OBJ conversion is unavailable"
        );
    }

    let fetcher = Arc::new(HttpFetcher::new().context("Failed to create download client")?);
    let http_client = reqwest::Client::builder()
        .timeout(SERVICE_HTTP_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;

    let storage_dir = config.storage_dir();
    let orchestrator = Orchestrator::new(
        db.clone(),
        providers,
        Arc::new(converter),
        fetcher.clone(),
        &storage_dir,
    );
    let enhancer = PromptEnhancer::new(
        http_client.clone(),
        config.credentials.get(Credential::OpenRouter).map(str::to_string),
    );
    let publisher = RobloxPublisher::new(
        http_client,
        config.credentials.get(Credential::Roblox).map(str::to_string),
        fetcher,
        &storage_dir,
    );

    let state = AppState::new(db, orchestrator, enhancer, publisher, &storage_dir);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("forge-models listening on http://{}", config.bind_address);
    info!("Health check: http://{}/api/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
