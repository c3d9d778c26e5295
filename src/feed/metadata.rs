//! Metadata descriptors (`.meta` files)
//!
//! A descriptor is a short text document of `key:value` lines:
//!
//! ```text
//! lastModifiedDate:2018-03-02T03:07:11-05:00
//! size:1266380
//! zipSize:84034
//! gzSize:83898
//! sha256:C9E6F0E3F2F4B4C1D5A1B1A0D0E8E4C7B2A6F1E3D0C9B8A7F6E5D4C3B2A1F0E9
//! ```
//!
//! Lines are split on the first colon only, so timestamps keep their own
//! colons. Unknown keys are kept as-is.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use super::FeedClient;
use crate::checksum::ContentDigest;
use crate::error::{Error, ParseError, Result};
use crate::retry::fetch_with_retry;
use crate::types::ArtifactId;

/// Descriptor key of the last modification timestamp
pub const LAST_MODIFIED_DATE: &str = "lastModifiedDate";
/// Descriptor key of the uncompressed size
pub const SIZE: &str = "size";
/// Descriptor key of the zip archive size
pub const ZIP_SIZE: &str = "zipSize";
/// Descriptor key of the gzip archive size
pub const GZ_SIZE: &str = "gzSize";
/// Descriptor key of the published SHA-256 digest
pub const SHA256: &str = "sha256";

/// Parsed metadata descriptor of one artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactMetadata {
    artifact: ArtifactId,
    entries: BTreeMap<String, String>,
}

impl ArtifactMetadata {
    /// Parse a descriptor body.
    ///
    /// Lines end in CRLF; a bare LF is accepted too. Empty lines are skipped.
    /// A line without `:` fails the whole descriptor. A repeated key keeps
    /// its last value.
    pub fn parse(artifact: ArtifactId, body: &str) -> std::result::Result<Self, ParseError> {
        let mut entries = BTreeMap::new();

        for (index, raw) in body.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(ParseError::MalformedLine {
                    artifact,
                    line: index + 1,
                    content: line.to_string(),
                });
            };
            entries.insert(key.to_string(), value.to_string());
        }

        Ok(Self { artifact, entries })
    }

    /// Artifact this descriptor belongs to
    pub fn artifact(&self) -> ArtifactId {
        self.artifact
    }

    /// Raw value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All entries, known and unknown, ordered by key
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the descriptor had no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw `lastModifiedDate` value
    pub fn last_modified_raw(&self) -> Option<&str> {
        self.get(LAST_MODIFIED_DATE)
    }

    /// `lastModifiedDate` as an RFC 3339 timestamp
    pub fn last_modified(&self) -> std::result::Result<Option<DateTime<FixedOffset>>, ParseError> {
        self.last_modified_raw()
            .map(|value| {
                DateTime::parse_from_rfc3339(value).map_err(|_| ParseError::InvalidField {
                    artifact: self.artifact,
                    key: LAST_MODIFIED_DATE,
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Uncompressed JSON size in bytes
    pub fn size(&self) -> std::result::Result<Option<u64>, ParseError> {
        self.number(SIZE)
    }

    /// Zip archive size in bytes
    pub fn zip_size(&self) -> std::result::Result<Option<u64>, ParseError> {
        self.number(ZIP_SIZE)
    }

    /// Gzip archive size in bytes
    pub fn gz_size(&self) -> std::result::Result<Option<u64>, ParseError> {
        self.number(GZ_SIZE)
    }

    /// Published digest. Missing or malformed digests are parse errors.
    pub fn published_digest(&self) -> std::result::Result<ContentDigest, ParseError> {
        let value = self.get(SHA256).ok_or(ParseError::MissingField {
            artifact: self.artifact,
            key: SHA256,
        })?;

        ContentDigest::parse(value).ok_or_else(|| ParseError::MalformedDigest {
            artifact: self.artifact,
            value: value.to_string(),
        })
    }

    fn number(&self, key: &'static str) -> std::result::Result<Option<u64>, ParseError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| ParseError::InvalidField {
                    artifact: self.artifact,
                    key,
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

impl FeedClient {
    /// Fetch and parse the descriptor of `artifact`.
    ///
    /// Transient transport failures are retried; a malformed body is not.
    pub async fn fetch_metadata(&self, artifact: ArtifactId) -> Result<ArtifactMetadata> {
        let url = self.locator().metadata_url(artifact);
        let url = url.as_str();

        let body = fetch_with_retry(&self.retry, || async move {
            let response = self.get(artifact, url).await?;
            response
                .text()
                .await
                .map_err(|e| self.request_error(artifact, url, e))
        })
        .await?;

        let metadata = ArtifactMetadata::parse(artifact, &body).map_err(Error::from)?;
        tracing::debug!(artifact = %artifact, entries = metadata.len(), "Parsed metadata descriptor");
        Ok(metadata)
    }
}
