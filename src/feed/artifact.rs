//! Compressed data artifacts (`.json.gz` files)

use std::fs::File;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use super::FeedClient;
use super::metadata::ArtifactMetadata;
use crate::checksum::{ContentDigest, digest_artifact_blocking};
use crate::error::{IntegrityError, Result, StorageError};
use crate::retry::fetch_with_retry;
use crate::types::ArtifactId;

/// A downloaded artifact on local disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactContent {
    /// Artifact id
    pub artifact: ArtifactId,
    /// Where the compressed file was written
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
    /// Digest computed after the write completed
    pub digest: ContentDigest,
}

impl ArtifactContent {
    /// Open the downloaded file read-only
    pub fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| StorageError::read(&self.path, e).into())
    }

    /// Compare the computed digest with the one `metadata` publishes.
    ///
    /// Case differences are not mismatches.
    pub fn verify(&self, metadata: &ArtifactMetadata) -> Result<()> {
        let published = metadata.published_digest()?;

        if !self.digest.matches(published.as_str()) {
            return Err(IntegrityError::DigestMismatch {
                artifact: self.artifact,
                expected: metadata
                    .get(super::metadata::SHA256)
                    .unwrap_or(published.as_str())
                    .to_string(),
                actual: self.digest.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl FeedClient {
    /// Download `artifact` into `<destination>/<id>.json.gz` and hash it.
    ///
    /// The body is streamed to disk chunk by chunk. A retried attempt
    /// truncates and rewrites the file.
    pub async fn fetch_artifact(
        &self,
        artifact: ArtifactId,
        destination: &Path,
    ) -> Result<ArtifactContent> {
        let url = self.locator().artifact_url(artifact);
        let url = url.as_str();
        let path = destination.join(artifact.archive_file_name());
        let file_path = path.as_path();

        let bytes = fetch_with_retry(&self.retry, || async move {
            self.download_to(artifact, url, file_path).await
        })
        .await?;

        let digest = digest_artifact_blocking(artifact, path.clone(), self.digest_scope()).await?;

        tracing::debug!(
            artifact = %artifact,
            bytes,
            digest = %digest,
            path = %path.display(),
            "Artifact downloaded"
        );

        Ok(ArtifactContent {
            artifact,
            path,
            bytes,
            digest,
        })
    }

    async fn download_to(&self, artifact: ArtifactId, url: &str, path: &Path) -> Result<u64> {
        let mut response = self.get(artifact, url).await?;

        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::write(path, e))?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(artifact, url, e))?
        {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| StorageError::write(path, e))?;
            written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| StorageError::write(path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| StorageError::write(path, e))?;

        Ok(written)
    }
}
