mod api;
mod backend;
mod cli;
mod config;
mod crypto;
mod error;
mod k8s;
mod kubectl;
mod manifest;
mod model;
mod registry;
mod ssh;
mod table;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CliArgs, Command, ServeArgs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::backend::CallPolicy;
use crate::config::ClusterStore;
use crate::crypto::CryptoManager;
use crate::registry::{ClusterRegistry, LiveBackends};

const SSH_CONTROL_DIR: &str = "kubedeck";

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let crypto = Arc::new(CryptoManager::open(&args.key_file)?);
    if let Some(path) = crypto.key_file() {
        debug!(key_file = %path.display(), "encryption key loaded");
    }
    let store = ClusterStore::new(&args.clusters_file, crypto);

    match args
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    {
        Command::Serve(serve_args) => serve(store, serve_args).await,
        Command::EncryptConfig => encrypt_config(&store),
        Command::ShowConfig => {
            print!("{}", store.decrypted_report()?);
            Ok(())
        }
    }
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

async fn serve(store: ClusterStore, args: ServeArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.request_timeout_secs.max(1));
    let policy = CallPolicy {
        timeout,
        read_retries: args.read_retries,
    };
    let factory = Arc::new(LiveBackends::new(
        std::env::temp_dir().join(SSH_CONTROL_DIR),
        timeout,
    ));

    info!(store = %store.path().display(), "loading clusters");
    let registry = Arc::new(ClusterRegistry::new(store, factory, policy));
    registry.bootstrap().await;

    let app = api::router(
        AppState {
            registry: registry.clone(),
        },
        args.static_dir.as_deref(),
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(address = %args.listen, "kubedeck listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    registry.shutdown().await;
    info!("cluster sessions closed");
    served
}

fn encrypt_config(store: &ClusterStore) -> Result<()> {
    let report = store.encrypt_existing()?;
    if let Some(backup) = report.backup.as_ref() {
        println!("backup written to {}", backup.display());
    }
    for id in &report.encrypted {
        println!("encrypted: {id}");
    }
    for id in &report.skipped {
        println!("already encrypted: {id}");
    }
    if report.encrypted.is_empty() {
        println!("no plaintext passwords found");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!("failed to register SIGTERM handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
