//! The merged dataset (`db.json`)
//!
//! ```json
//! {
//!   "generated_at": "2024-05-01T12:00:00Z",
//!   "feed_version": "1.0",
//!   "sources": { "2002": { "sha256": "...", "last_modified": "...", "cve_count": 6748 } },
//!   "items": { "CVE-2002-0001": { ...original CVE item... } }
//! }
//! ```
//!
//! Items are keyed by CVE id. Applying an artifact replaces items with the
//! same id and keeps all others, so applying artifacts in catalog order lets
//! the `modified` delta win over the annual snapshots.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::ContentDigest;
use crate::error::{ParseError, Result, StorageError};
use crate::feed::{ArtifactContent, ArtifactMetadata};
use crate::types::ArtifactId;

/// Provenance of the items one artifact contributed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Verified digest of the artifact
    pub sha256: ContentDigest,
    /// `lastModifiedDate` from its descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Number of CVE items it carried
    pub cve_count: usize,
}

/// Consolidated CVE data
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// When the dataset was last written
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    /// Feed format version the items came from
    #[serde(default)]
    pub feed_version: String,
    /// Artifacts merged so far
    #[serde(default)]
    pub sources: BTreeMap<ArtifactId, SourceRecord>,
    /// CVE items keyed by id
    #[serde(default)]
    pub items: BTreeMap<String, Value>,
}

/// The parts of a feed document the merge needs
#[derive(Deserialize)]
struct FeedDocument {
    #[serde(rename = "CVE_Items")]
    items: Vec<Value>,
}

impl Dataset {
    /// Empty dataset for `feed_version`
    pub fn new(feed_version: impl Into<String>) -> Self {
        Self {
            feed_version: feed_version.into(),
            ..Self::default()
        }
    }

    /// Read a dataset file
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| StorageError::read(path, e))?;

        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ParseError::Dataset {
                path: path.to_path_buf(),
                reason: format!("{e} (run a full synchronization to rebuild it)"),
            }
            .into()
        })
    }

    /// Write the dataset and flush it to disk
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| StorageError::write(path, e))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, self)
            .map_err(|e| StorageError::write(path, std::io::Error::other(e)))?;
        writer.flush().map_err(|e| StorageError::write(path, e))?;

        let file = writer
            .into_inner()
            .map_err(|e| StorageError::write(path, e.into_error()))?;
        file.sync_all().map_err(|e| StorageError::write(path, e))?;

        Ok(())
    }

    /// Number of CVE items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the dataset holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item for `cve_id`
    pub fn get(&self, cve_id: &str) -> Option<&Value> {
        self.items.get(cve_id)
    }

    /// Merge the items of a decompressed feed document.
    ///
    /// Returns the number of items the document carried. The document is
    /// decoded completely before anything is merged, so a malformed document
    /// leaves the dataset unchanged.
    pub fn apply_feed<R: Read>(&mut self, artifact: ArtifactId, reader: R) -> Result<usize> {
        let document: FeedDocument =
            serde_json::from_reader(BufReader::new(reader)).map_err(|e| ParseError::Feed {
                artifact,
                reason: e.to_string(),
            })?;

        let mut keyed = Vec::with_capacity(document.items.len());
        for (index, item) in document.items.into_iter().enumerate() {
            let Some(id) = item
                .pointer("/cve/CVE_data_meta/ID")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                return Err(ParseError::Feed {
                    artifact,
                    reason: format!("CVE item {index} has no cve.CVE_data_meta.ID"),
                }
                .into());
            };
            keyed.push((id, item));
        }

        let count = keyed.len();
        self.items.extend(keyed);
        Ok(count)
    }

    /// Merge a verified artifact and record where its items came from
    pub fn apply_artifact(
        &mut self,
        content: &ArtifactContent,
        metadata: &ArtifactMetadata,
    ) -> Result<usize> {
        let file = content.open()?;
        let count = self.apply_feed(content.artifact, GzDecoder::new(file))?;

        self.sources.insert(
            content.artifact,
            SourceRecord {
                sha256: content.digest.clone(),
                last_modified: metadata.last_modified_raw().map(str::to_string),
                cve_count: count,
            },
        );

        tracing::debug!(artifact = %content.artifact, cve_count = count, "Merged artifact");
        Ok(count)
    }
}
