//! cartsync command-line interface.
//!
//! Thin wiring only: loads the connection profile, validates it, and hands
//! off to the library crates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cartsync_config::Config;
use cartsync_queue::SerialQueue;
use cartsync_transport::Transport;
use cartsync_watch::SyncEngine;
use cartsync_webdav::DavClient;
use cartsync_workflow::{run_meta_import, run_site_import, WorkflowClient};

#[derive(Debug, Parser)]
#[command(about = "Deploy and sync cartridges to a remote storefront instance", version)]
struct Cli {
    /// Path to the connection profile.
    #[arg(long, default_value = "cartsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch cartridge roots and mirror changes to the remote tree.
    Watch,

    /// Zip the cartridges and deploy them into the code version.
    DeployCode,

    /// Zip a site directory and run a full site import.
    ImportSite {
        /// Directory holding the site payload.
        dir: PathBuf,
    },

    /// Zip a metadata directory, validate it remotely, then import it.
    ImportMeta {
        /// Directory holding the metadata payload.
        dir: PathBuf,
    },

    /// Activate the configured code version.
    Activate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("could not load profile {}", cli.config.display()))?;
    config.validate()?;

    match cli.command {
        Command::Watch => watch(&config).await,
        Command::DeployCode => deploy_code(&config).await,
        Command::ImportSite { dir } => import_site(&config, &dir).await,
        Command::ImportMeta { dir } => import_meta(&config, &dir).await,
        Command::Activate => activate(&config).await,
    }
}

fn dav_client(config: &Config) -> Result<DavClient> {
    let transport = Transport::new(
        &config.base_url(),
        Duration::from_secs(config.request_timeout),
    )?
    .with_basic_auth(&config.username, &config.password);
    Ok(DavClient::new(transport, &config.code_version))
}

fn workflow_client(config: &Config) -> Result<WorkflowClient> {
    let transport = Transport::new(
        &config.base_url(),
        Duration::from_secs(config.request_timeout),
    )?;
    Ok(WorkflowClient::new(
        transport,
        &config.username,
        &config.password,
    ))
}

/// Cartridge roots to watch: the configured list, or every directory
/// under `<root>/cartridges` when no list is given.
fn cartridge_roots(config: &Config) -> Result<Vec<PathBuf>> {
    let base = config.root.join("cartridges");
    if !config.cartridges.is_empty() {
        return Ok(config.cartridges.iter().map(|c| base.join(c)).collect());
    }

    let mut roots = Vec::new();
    for entry in std::fs::read_dir(&base)
        .with_context(|| format!("could not read {}", base.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            roots.push(path);
        }
    }
    Ok(roots)
}

async fn watch(config: &Config) -> Result<()> {
    let client = Arc::new(dav_client(config)?);
    let queue = Arc::new(SerialQueue::new());
    let engine = SyncEngine::new(client, Arc::clone(&queue), &config.exclude)?;

    let roots = cartridge_roots(config)?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing queued transfers");
            signal_cancel.cancel();
        }
    });

    engine.run(roots, cancel).await?;
    Ok(())
}

async fn deploy_code(config: &Config) -> Result<()> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let archive = config.temp_dir().join(format!("cartsync_code_{stamp}.zip"));

    let base = config.root.join("cartridges");
    cartsync_archive::compress(&base, &archive, &[], "", &config.exclude)?;
    info!(archive = %archive.display(), "code archive built");

    let client = dav_client(config)?;
    let result = client.deploy_archive(&archive).await;

    // The local archive is a temporary artifact either way.
    if let Err(e) = std::fs::remove_file(&archive) {
        warn!(archive = %archive.display(), error = %e, "could not remove local archive");
    }

    result?;
    info!(code_version = %config.code_version, "code deployed");
    Ok(())
}

async fn import_site(config: &Config, dir: &PathBuf) -> Result<()> {
    let archive = build_payload(config, dir, "site")?;
    let mut client = workflow_client(config)?;
    run_site_import(
        &mut client,
        &archive,
        Duration::from_secs(config.poll_interval),
    )
    .await?;
    info!("site import finished");
    Ok(())
}

async fn import_meta(config: &Config, dir: &PathBuf) -> Result<()> {
    let archive = build_payload(config, dir, "meta")?;
    let mut client = workflow_client(config)?;
    run_meta_import(
        &mut client,
        &archive,
        Duration::from_secs(config.poll_interval),
    )
    .await?;
    info!("metadata import finished");
    Ok(())
}

fn build_payload(config: &Config, dir: &PathBuf, kind: &str) -> Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let archive = config
        .temp_dir()
        .join(format!("cartsync_{kind}_{stamp}.zip"));
    cartsync_archive::compress(dir, &archive, &[], "", &config.exclude)?;
    info!(archive = %archive.display(), "payload built");
    Ok(archive)
}

async fn activate(config: &Config) -> Result<()> {
    let mut client = workflow_client(config)?;
    client.login().await?;
    client.activate_code_version(&config.code_version).await?;
    Ok(())
}
