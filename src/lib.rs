//! # nvd-search
//!
//! Local mirror of the NVD JSON vulnerability feeds.
//!
//! A [`Synchronizer`] keeps a store directory in step with the remote feed:
//!
//! - **First run** - the store has no `db.json`, so every annual artifact
//!   from 2002 through the current year plus the `modified` delta is fetched
//! - **Later runs** - only the `modified` delta is fetched and merged on top
//! - **Verified** - every artifact is hashed and compared against the SHA-256
//!   its descriptor publishes before anything is merged
//! - **All or nothing** - any failure leaves the store exactly as it was
//!
//! ## Quick Start
//!
//! ```no_run
//! use nvd_search::{Config, Synchronizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let synchronizer = Synchronizer::new(Config::with_store("~/.config/nvd-cli/db"))?;
//!
//!     // Subscribe to events
//!     let mut events = synchronizer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = synchronizer.sync().await?;
//!     println!("{} CVEs in the local dataset", report.cve_count);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// SHA-256 content digests
pub mod checksum;
/// Command-line surface
pub mod cli;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Remote feed access
pub mod feed;
/// Retry logic with exponential backoff
pub mod retry;
/// Local store and dataset
pub mod store;
/// Synchronization orchestrator
pub mod sync;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use checksum::ContentDigest;
pub use config::{Config, DigestScope};
pub use error::{Error, IntegrityError, ParseError, Result, StorageError, TransportError};
pub use feed::{ArtifactMetadata, FeedLocator};
pub use store::{Dataset, LocalStore};
pub use sync::Synchronizer;
pub use types::{
    ArtifactId, ArtifactSummary, Event, SyncMode, SyncPhase, SyncReport, SyncState,
};

/// Run one synchronization that a termination signal can interrupt.
///
/// On a signal the synchronizer's cancellation token is cancelled, the
/// running phase is abandoned, and [`Error::Cancelled`] is returned. The store
/// is left as it was.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use nvd_search::{Config, Synchronizer, sync_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let synchronizer = Synchronizer::new(Config::default())?;
///
///     // Ctrl+C aborts the run cleanly
///     let report = sync_with_shutdown(&synchronizer, false).await?;
///     println!("{:?}", report.state);
///
///     Ok(())
/// }
/// ```
pub async fn sync_with_shutdown(synchronizer: &Synchronizer, force_full: bool) -> Result<SyncReport> {
    let cancel = synchronizer.cancellation_token();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Cancelling synchronization");
        cancel.cancel();
    });

    let result = if force_full {
        synchronizer.sync_full().await
    } else {
        synchronizer.sync().await
    };

    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
