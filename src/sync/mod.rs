//! Synchronization orchestrator
//!
//! A run walks `Uninitialized → ModeDecided → MetadataFetched →
//! ArtifactsFetched → Reconciled`, or stops in `Failed`:
//!
//! - **mode decision** - ensure the store, probe `db.json`, pick full or incremental
//! - **metadata** - fetch every descriptor of the catalog concurrently
//! - **artifact** - download every artifact of the catalog concurrently into staging
//! - **reconcile** - verify every digest, merge, and commit
//!
//! Any failure aborts the run before the commit, so the store is either left
//! as it was or fully updated.

mod fanout;
mod state;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::checksum::ContentDigest;
use crate::config::Config;
use crate::error::{Error, IntegrityError, Result, StorageError};
use crate::feed::{ArtifactContent, ArtifactMetadata, FeedClient, build_catalog};
use crate::store::{Dataset, LocalStore, Staging, StoreStatus};
use crate::types::{
    ArtifactId, ArtifactSummary, Event, SyncMode, SyncPhase, SyncReport,
};
use crate::utils::{expand_home, get_available_space};

use fanout::fan_out;
use state::SyncRun;

/// Keeps a local store in step with the remote feed
///
/// # Example
///
/// ```no_run
/// use nvd_search::{Config, Synchronizer};
///
/// # async fn example() -> nvd_search::Result<()> {
/// let synchronizer = Synchronizer::new(Config::with_store("/var/lib/nvd"))?;
///
/// let mut events = synchronizer.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         tracing::info!(?event, "sync event");
///     }
/// });
///
/// let report = synchronizer.sync().await?;
/// println!("{} CVEs ({} mode)", report.cve_count, report.mode);
/// # Ok(())
/// # }
/// ```
pub struct Synchronizer {
    /// Validated configuration with the store path expanded
    config: Arc<Config>,
    /// HTTP access to the feed
    client: FeedClient,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cancels the running phase
    cancel: CancellationToken,
    /// Year used for the catalog instead of the clock
    current_year: Option<i32>,
}

/// Outcome of the mode decision phase
struct ModeDecision {
    store: LocalStore,
    staging: Staging,
    mode: SyncMode,
    store_initialized: bool,
    previous_digest: Option<ContentDigest>,
}

/// Outcome of a merge
struct MergeOutcome {
    artifacts: Vec<ArtifactSummary>,
    contents: Vec<ArtifactContent>,
    cve_count: usize,
}

impl Synchronizer {
    /// Create a synchronizer for `config`
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client cannot be created
    pub fn new(mut config: Config) -> Result<Self> {
        config.validate()?;
        config.store.path = expand_home(&config.store.path);

        let client = FeedClient::new(&config)?;

        // Lagging subscribers lose the oldest events, never block the run
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
            cancel: CancellationToken::new(),
            current_year: None,
        })
    }

    /// Build catalogs for `year` instead of the current UTC year
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that aborts a running synchronization with [`Error::Cancelled`]
    ///
    /// Cancellation is permanent for this synchronizer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Synchronize: incremental when `db.json` exists, full otherwise
    pub async fn sync(&self) -> Result<SyncReport> {
        self.run(false).await
    }

    /// Synchronize every artifact and rebuild the dataset from scratch
    pub async fn sync_full(&self) -> Result<SyncReport> {
        self.run(true).await
    }

    fn current_year(&self) -> i32 {
        self.current_year.unwrap_or_else(crate::feed::current_year)
    }

    fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }

    async fn run(&self, force_full: bool) -> Result<SyncReport> {
        let mut run = SyncRun::new();

        match self.drive(&mut run, force_full).await {
            Ok(report) => Ok(report),
            Err(e) => {
                run.fail();
                if e.is_cancelled() {
                    tracing::warn!("Synchronization cancelled");
                } else {
                    tracing::error!(phase = ?e.phase(), error = %e, "Synchronization failed");
                }
                self.emit_event(Event::Failed {
                    phase: e.phase(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut SyncRun, force_full: bool) -> Result<SyncReport> {
        let ModeDecision {
            store,
            staging,
            mode,
            store_initialized,
            previous_digest,
        } = self
            .decide_mode(force_full)
            .await
            .map_err(|e| e.in_phase(SyncPhase::ModeDecision))?;
        run.complete(SyncPhase::ModeDecision)?;

        let outcome = self.fetch_and_reconcile(run, &store, &staging, mode).await;

        if let Err(e) = staging.discard().await {
            tracing::warn!(error = %e, "Failed to remove staging directory");
        }
        let merged = outcome?;

        tracing::info!(
            mode = %mode,
            artifacts = merged.artifacts.len(),
            cve_count = merged.cve_count,
            "Synchronization complete"
        );

        Ok(SyncReport {
            mode,
            store_initialized,
            previous_digest,
            artifacts: merged.artifacts,
            cve_count: merged.cve_count,
            state: run.state(),
        })
    }

    async fn decide_mode(&self, force_full: bool) -> Result<ModeDecision> {
        let store = LocalStore::open(&self.config.store.path).await?;

        let (mode, store_initialized, previous_digest) = match store.probe().await? {
            StoreStatus::Missing => {
                tracing::info!(
                    store = %store.root().display(),
                    "No local dataset, creating it from scratch"
                );
                (SyncMode::Full, true, None)
            }
            StoreStatus::Present { digest } => {
                tracing::info!(digest = %digest, "Found local dataset");
                let mode = if force_full {
                    SyncMode::Full
                } else {
                    SyncMode::Incremental
                };
                (mode, false, Some(digest))
            }
        };

        let staging = store.begin_staging().await?;

        self.emit_event(Event::ModeDecided {
            mode,
            store_initialized,
            previous_digest: previous_digest.clone(),
        });

        Ok(ModeDecision {
            store,
            staging,
            mode,
            store_initialized,
            previous_digest,
        })
    }

    async fn fetch_and_reconcile(
        &self,
        run: &mut SyncRun,
        store: &LocalStore,
        staging: &Staging,
        mode: SyncMode,
    ) -> Result<MergeOutcome> {
        let catalog = build_catalog(mode, self.current_year());
        let concurrency = self.config.fetch.max_concurrent_fetches;

        tracing::info!(mode = %mode, artifacts = catalog.len(), "Fetching metadata");
        self.emit_event(Event::PhaseStarted {
            phase: SyncPhase::Metadata,
            artifacts: catalog.len(),
        });
        let metadata = fan_out(&catalog, concurrency, &self.cancel, |artifact| async move {
            let metadata = self.client.fetch_metadata(artifact).await?;
            self.emit_event(Event::MetadataFetched { artifact });
            Ok::<_, Error>(metadata)
        })
        .await
        .map_err(|e| e.in_phase(SyncPhase::Metadata))?;
        run.complete(SyncPhase::Metadata)?;

        tracing::info!(artifacts = catalog.len(), "Downloading artifacts");
        self.emit_event(Event::PhaseStarted {
            phase: SyncPhase::Artifacts,
            artifacts: catalog.len(),
        });
        self.check_disk_space(staging.path(), &metadata)
            .map_err(|e| e.in_phase(SyncPhase::Artifacts))?;

        let destination = staging.path();
        let contents = fan_out(&catalog, concurrency, &self.cancel, |artifact| async move {
            let content = self.client.fetch_artifact(artifact, destination).await?;
            self.emit_event(Event::ArtifactDownloaded {
                artifact,
                bytes: content.bytes,
            });
            Ok::<_, Error>(content)
        })
        .await
        .map_err(|e| e.in_phase(SyncPhase::Artifacts))?;
        run.complete(SyncPhase::Artifacts)?;

        self.emit_event(Event::PhaseStarted {
            phase: SyncPhase::Reconcile,
            artifacts: catalog.len(),
        });
        let merged = self
            .reconcile(store, staging, mode, metadata, contents)
            .await
            .map_err(|e| e.in_phase(SyncPhase::Reconcile))?;
        run.complete(SyncPhase::Reconcile)?;

        self.emit_event(Event::Reconciled {
            mode,
            cve_count: merged.cve_count,
        });
        Ok(merged)
    }

    /// Verify every artifact, then merge and commit. Nothing is written to
    /// the store unless every digest matches.
    async fn reconcile(
        &self,
        store: &LocalStore,
        staging: &Staging,
        mode: SyncMode,
        mut metadata: BTreeMap<ArtifactId, ArtifactMetadata>,
        contents: BTreeMap<ArtifactId, ArtifactContent>,
    ) -> Result<MergeOutcome> {
        let mut batch = Vec::with_capacity(contents.len());

        // BTreeMap order is catalog order, so the delta is applied last
        for (artifact, content) in contents {
            let meta = metadata
                .remove(&artifact)
                .ok_or(IntegrityError::MissingArtifact { artifact })?;
            content.verify(&meta)?;

            tracing::debug!(artifact = %artifact, digest = %content.digest, "Digest verified");
            self.emit_event(Event::ArtifactVerified { artifact });
            batch.push((content, meta));
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let base = match mode {
            SyncMode::Full => Dataset::new(self.config.feed.version.clone()),
            SyncMode::Incremental => {
                let mut dataset = store.load_dataset().await?;
                if dataset.feed_version != self.config.feed.version {
                    tracing::warn!(
                        dataset_version = %dataset.feed_version,
                        feed_version = %self.config.feed.version,
                        "Dataset was built from another feed version, run a full synchronization to rebuild it"
                    );
                    dataset.feed_version = self.config.feed.version.clone();
                }
                dataset
            }
        };

        let target = staging.dataset_path();
        let merged = tokio::task::spawn_blocking(move || merge_batch(base, batch, target))
            .await
            .map_err(|e| Error::Other(format!("merge task failed: {}", e)))??;

        store.commit(staging, &merged.contents).await?;
        Ok(merged)
    }

    /// Fail early when the store cannot hold the artifacts about to be downloaded
    fn check_disk_space(
        &self,
        path: &Path,
        metadata: &BTreeMap<ArtifactId, ArtifactMetadata>,
    ) -> Result<()> {
        let settings = &self.config.disk_space;
        if !settings.enabled {
            return Ok(());
        }

        let mut published: u64 = 0;
        for meta in metadata.values() {
            published = published
                .saturating_add(meta.gz_size()?.unwrap_or(0))
                .saturating_add(meta.size()?.unwrap_or(0));
        }

        let required =
            ((published as f64 * settings.size_multiplier) as u64).saturating_add(settings.min_free_space);

        let available =
            get_available_space(path).map_err(|e| StorageError::DiskSpaceCheckFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if available < required {
            return Err(StorageError::InsufficientSpace {
                required,
                available,
            }
            .into());
        }

        tracing::debug!(required, available, "Disk space check passed");
        Ok(())
    }
}

/// Apply a verified batch to `dataset` and write the result to `target`
fn merge_batch(
    mut dataset: Dataset,
    batch: Vec<(ArtifactContent, ArtifactMetadata)>,
    target: PathBuf,
) -> Result<MergeOutcome> {
    let mut artifacts = Vec::with_capacity(batch.len());
    let mut contents = Vec::with_capacity(batch.len());

    for (content, meta) in batch {
        let cve_count = dataset.apply_artifact(&content, &meta)?;
        artifacts.push(ArtifactSummary {
            artifact: content.artifact,
            bytes: content.bytes,
            digest: content.digest.clone(),
            last_modified: meta.last_modified_raw().map(str::to_string),
            cve_count,
        });
        contents.push(content);
    }

    dataset.generated_at = Some(chrono::Utc::now());
    dataset.write(&target)?;

    Ok(MergeOutcome {
        artifacts,
        contents,
        cve_count: dataset.len(),
    })
}
