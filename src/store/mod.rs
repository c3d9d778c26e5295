//! Local store layout
//!
//! ```text
//! <root>/
//!   db.json            merged dataset (presence selects incremental mode)
//!   <id>.json.gz       last verified copy of each artifact
//!   .staging/          downloads of the running synchronization
//! ```
//!
//! A run downloads into `.staging`, writes the merged dataset there, and only
//! after every artifact verified moves the artifacts into the root and renames
//! the new dataset over `db.json`. Replaced artifacts are parked in
//! `.staging/.previous` so a failed commit can put them back. The staging
//! directory is removed at the end of every run.

use std::path::{Path, PathBuf};

use crate::checksum::{ContentDigest, digest_file_blocking};
use crate::error::{Result, StorageError};
use crate::feed::ArtifactContent;

pub mod dataset;

pub use dataset::{Dataset, SourceRecord};

/// File name of the merged dataset
pub const DATASET_FILE: &str = "db.json";

/// Directory holding the downloads of the running synchronization
pub const STAGING_DIR: &str = ".staging";

/// File name of the new dataset inside the staging directory
const STAGED_DATASET_FILE: &str = "db.json.tmp";

/// Directory inside staging holding the artifacts a commit replaced
const BACKUP_DIR: &str = ".previous";

/// Whether a dataset exists, and its digest when it does
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreStatus {
    /// No `db.json`: the store has never completed a synchronization
    Missing,
    /// `db.json` exists
    Present {
        /// SHA-256 of the dataset file
        digest: ContentDigest,
    },
}

/// The store directory
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Ensure the store directory exists (mode 0755 on Unix) and open it
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        create_dir(&root).await?;
        Ok(Self { root })
    }

    /// Store directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `db.json`
    pub fn dataset_path(&self) -> PathBuf {
        self.root.join(DATASET_FILE)
    }

    /// Path of the committed copy of `artifact`
    pub fn artifact_path(&self, artifact: crate::types::ArtifactId) -> PathBuf {
        self.root.join(artifact.archive_file_name())
    }

    /// Check for `db.json` and hash it when present
    pub async fn probe(&self) -> Result<StoreStatus> {
        let path = self.dataset_path();

        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreStatus::Missing),
            Err(e) => return Err(StorageError::read(&path, e).into()),
        }

        let digest = digest_file_blocking(path).await?;
        Ok(StoreStatus::Present { digest })
    }

    /// Read the current dataset
    pub async fn load_dataset(&self) -> Result<Dataset> {
        let path = self.dataset_path();
        tokio::task::spawn_blocking(move || Dataset::read(&path))
            .await
            .map_err(|e| crate::error::Error::Other(format!("dataset read task failed: {}", e)))?
    }

    /// Create a fresh staging directory, removing leftovers of an interrupted run
    pub async fn begin_staging(&self) -> Result<Staging> {
        let dir = self.root.join(STAGING_DIR);

        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tracing::warn!(path = %dir.display(), "Removing leftover staging directory");
            remove_dir(&dir).await?;
        }
        create_dir(&dir).await?;

        Ok(Staging { dir })
    }

    /// Publish a reconciled run.
    ///
    /// Moves every artifact from staging into the root, parking the copy it
    /// replaces under the staging backup directory, then renames the staged
    /// dataset over `db.json`. The final rename is the commit point; until it
    /// happens readers keep seeing the previous dataset. If any step fails,
    /// every move already made is undone so the store is left as it was.
    pub async fn commit(&self, staging: &Staging, artifacts: &[ArtifactContent]) -> Result<()> {
        let mut journal = Vec::with_capacity(artifacts.len() * 2 + 1);

        if let Err(e) = self.swap_in(staging, artifacts, &mut journal).await {
            roll_back(journal).await;
            return Err(e);
        }

        tracing::info!(
            path = %self.dataset_path().display(),
            artifacts = artifacts.len(),
            "Committed dataset"
        );
        Ok(())
    }

    async fn swap_in(
        &self,
        staging: &Staging,
        artifacts: &[ArtifactContent],
        journal: &mut Vec<Move>,
    ) -> Result<()> {
        let backup = staging.backup_path();
        create_dir(&backup).await?;

        for content in artifacts {
            let target = self.artifact_path(content.artifact);

            if tokio::fs::symlink_metadata(&target).await.is_ok() {
                let parked = backup.join(content.artifact.archive_file_name());
                move_path(&target, &parked, journal).await?;
            }
            move_path(&content.path, &target, journal).await?;
        }

        move_path(&staging.dataset_path(), &self.dataset_path(), journal).await
    }
}

/// One rename performed during a commit
#[derive(Debug)]
struct Move {
    from: PathBuf,
    to: PathBuf,
}

async fn move_path(from: &Path, to: &Path, journal: &mut Vec<Move>) -> Result<()> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| StorageError::write(to, e))?;
    journal.push(Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    });
    Ok(())
}

/// Undo the renames of a failed commit, newest first
async fn roll_back(journal: Vec<Move>) {
    for step in journal.into_iter().rev() {
        if let Err(e) = tokio::fs::rename(&step.to, &step.from).await {
            tracing::error!(
                from = %step.to.display(),
                to = %step.from.display(),
                error = %e,
                "Failed to restore store entry after aborted commit"
            );
        }
    }
    tracing::warn!("Commit aborted, store changes rolled back");
}

/// Scratch directory owned by one run
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    /// Directory artifacts are downloaded into
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Where the merged dataset is written before commit
    pub fn dataset_path(&self) -> PathBuf {
        self.dir.join(STAGED_DATASET_FILE)
    }

    /// Where a commit parks the artifacts it replaces
    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    /// Remove the staging directory and everything left in it
    pub async fn discard(self) -> Result<()> {
        remove_dir(&self.dir).await
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);

    builder
        .create(path)
        .await
        .map_err(|e| {
            StorageError::CreateDir {
                path: path.to_path_buf(),
                source: e,
            }
            .into()
        })
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::write(path, e).into()),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::digest_reader;
    use crate::error::Error;
    use crate::types::ArtifactId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_nested_store() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("config/nvd-cli/db");

        let store = LocalStore::open(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root);
        assert_eq!(store.dataset_path(), root.join("db.json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_uses_mode_0755() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("db");
        LocalStore::open(&root).await.unwrap();

        let mode = std::fs::metadata(&root).unwrap().permissions().mode() & 0o777;
        // The process umask can only remove bits
        assert_eq!(mode & !0o755, 0, "mode was {mode:o}");
    }

    #[tokio::test]
    async fn open_on_a_file_is_a_storage_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("db");
        std::fs::write(&file, "not a directory").unwrap();

        let err = LocalStore::open(&file).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::CreateDir { .. })));
    }

    #[tokio::test]
    async fn probe_reports_missing_then_present() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();

        assert_eq!(store.probe().await.unwrap(), StoreStatus::Missing);

        std::fs::write(store.dataset_path(), b"hello world").unwrap();
        assert_eq!(
            store.probe().await.unwrap(),
            StoreStatus::Present {
                digest: digest_reader(&b"hello world"[..]).unwrap()
            }
        );
    }

    #[tokio::test]
    async fn begin_staging_clears_leftovers() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();

        let leftover = temp.path().join(STAGING_DIR).join("2002.json.gz");
        std::fs::create_dir_all(leftover.parent().unwrap()).unwrap();
        std::fs::write(&leftover, b"partial").unwrap();

        let staging = store.begin_staging().await.unwrap();
        assert!(staging.path().is_dir());
        assert!(!leftover.exists());

        staging.discard().await.unwrap();
        assert!(!temp.path().join(STAGING_DIR).exists());
    }

    #[tokio::test]
    async fn commit_moves_artifacts_and_replaces_dataset() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        std::fs::write(store.dataset_path(), b"old").unwrap();

        let staging = store.begin_staging().await.unwrap();
        let artifact_path = staging.path().join("modified.json.gz");
        std::fs::write(&artifact_path, b"gz").unwrap();
        std::fs::write(staging.dataset_path(), b"new").unwrap();

        let content = ArtifactContent {
            artifact: ArtifactId::Modified,
            path: artifact_path,
            bytes: 2,
            digest: digest_reader(&b"gz"[..]).unwrap(),
        };
        store.commit(&staging, &[content]).await.unwrap();
        staging.discard().await.unwrap();

        assert_eq!(std::fs::read(store.dataset_path()).unwrap(), b"new");
        assert_eq!(
            std::fs::read(store.artifact_path(ArtifactId::Modified)).unwrap(),
            b"gz"
        );
        assert!(!temp.path().join(STAGING_DIR).exists());
    }

    fn stage(staging: &Staging, artifact: ArtifactId, bytes: &[u8]) -> ArtifactContent {
        let path = staging.path().join(artifact.archive_file_name());
        std::fs::write(&path, bytes).unwrap();
        ArtifactContent {
            artifact,
            path,
            bytes: bytes.len() as u64,
            digest: digest_reader(bytes).unwrap(),
        }
    }

    fn seed_store(store: &LocalStore) {
        std::fs::write(store.dataset_path(), b"old dataset").unwrap();
        std::fs::write(store.artifact_path(ArtifactId::Year(2002)), b"old 2002").unwrap();
        std::fs::write(store.artifact_path(ArtifactId::Year(2003)), b"old 2003").unwrap();
    }

    fn assert_seeded(store: &LocalStore) {
        assert_eq!(std::fs::read(store.dataset_path()).unwrap(), b"old dataset");
        assert_eq!(
            std::fs::read(store.artifact_path(ArtifactId::Year(2002))).unwrap(),
            b"old 2002"
        );
        assert_eq!(
            std::fs::read(store.artifact_path(ArtifactId::Year(2003))).unwrap(),
            b"old 2003"
        );
    }

    #[tokio::test]
    async fn commit_replaces_existing_artifacts() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        seed_store(&store);

        let staging = store.begin_staging().await.unwrap();
        let contents = [
            stage(&staging, ArtifactId::Year(2002), b"new 2002"),
            stage(&staging, ArtifactId::Year(2003), b"new 2003"),
        ];
        std::fs::write(staging.dataset_path(), b"new dataset").unwrap();

        store.commit(&staging, &contents).await.unwrap();
        staging.discard().await.unwrap();

        assert_eq!(std::fs::read(store.dataset_path()).unwrap(), b"new dataset");
        assert_eq!(
            std::fs::read(store.artifact_path(ArtifactId::Year(2003))).unwrap(),
            b"new 2003"
        );
        assert!(!temp.path().join(STAGING_DIR).exists());
    }

    // Renaming a file onto a non-empty directory fails on unix
    #[cfg(unix)]
    #[tokio::test]
    async fn blocked_artifact_rename_rolls_back_earlier_moves() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        seed_store(&store);

        let staging = store.begin_staging().await.unwrap();
        let contents = [
            stage(&staging, ArtifactId::Year(2002), b"new 2002"),
            stage(&staging, ArtifactId::Year(2003), b"new 2003"),
        ];
        std::fs::write(staging.dataset_path(), b"new dataset").unwrap();

        // The slot 2003 would be parked in is taken, so its swap fails after 2002 moved
        std::fs::create_dir_all(staging.backup_path().join("2003.json.gz").join("taken")).unwrap();

        let err = store.commit(&staging, &contents).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Write { .. })));

        assert_seeded(&store);
        assert_eq!(std::fs::read(&contents[0].path).unwrap(), b"new 2002");
        assert_eq!(std::fs::read(staging.dataset_path()).unwrap(), b"new dataset");

        staging.discard().await.unwrap();
        let mut names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["2002.json.gz", "2003.json.gz", "db.json"]);
    }

    #[tokio::test]
    async fn failed_dataset_rename_restores_every_artifact() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        seed_store(&store);

        let staging = store.begin_staging().await.unwrap();
        let contents = [
            stage(&staging, ArtifactId::Year(2002), b"new 2002"),
            stage(&staging, ArtifactId::Year(2003), b"new 2003"),
            stage(&staging, ArtifactId::Modified, b"new modified"),
        ];
        // No staged dataset, so the last rename fails

        let err = store.commit(&staging, &contents).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Write { .. })));

        assert_seeded(&store);
        assert!(!store.artifact_path(ArtifactId::Modified).exists());
        for content in &contents {
            assert!(content.path.is_file(), "{} is back in staging", content.artifact);
        }
    }

    #[tokio::test]
    async fn discard_twice_is_harmless() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();

        store.begin_staging().await.unwrap().discard().await.unwrap();
        store.begin_staging().await.unwrap().discard().await.unwrap();
    }

    #[tokio::test]
    async fn load_dataset_reads_db_json() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        Dataset::new("1.0").write(&store.dataset_path()).unwrap();

        let dataset = store.load_dataset().await.unwrap();
        assert_eq!(dataset.feed_version, "1.0");
        assert!(dataset.is_empty());
    }
}
