//! `nvd-search` entry point
//!
//! Brings the local store up to date, then hands the search parameters to the
//! query layer.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nvd_search::cli::Cli;
use nvd_search::{Event, Synchronizer, sync_with_shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config().context("invalid configuration")?;
    let store = config.store.path.clone();

    let synchronizer = Synchronizer::new(config).context("cannot start synchronization")?;

    let mut events = synchronizer.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::ArtifactDownloaded { artifact, bytes } => {
                    tracing::info!(%artifact, bytes, "Downloaded");
                }
                Event::ArtifactVerified { artifact } => {
                    tracing::debug!(%artifact, "Verified");
                }
                _ => {}
            }
        }
    });

    let report = sync_with_shutdown(&synchronizer, cli.full)
        .await
        .with_context(|| format!("synchronization of {} failed", store.display()))?;

    if report.store_initialized {
        println!("Initialized {}", store.display());
    }
    println!(
        "{} synchronization: {} artifact(s), {} CVEs",
        report.mode,
        report.artifacts.len(),
        report.cve_count
    );
    for artifact in &report.artifacts {
        println!(
            "  {:<10} {:>12} bytes  sha256 {}",
            artifact.artifact.to_string(),
            artifact.bytes,
            artifact.digest
        );
    }

    tracing::debug!(search = ?cli.search(), "Dataset ready for query");
    Ok(())
}
