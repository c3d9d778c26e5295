//! Remote feed access
//!
//! The feed publishes, per format version, one gzip-compressed JSON artifact
//! per calendar year plus a rolling `modified` delta, each accompanied by a
//! plain-text `.meta` descriptor:
//!
//! ```text
//! <base>json/cve/<version>/nvdcve-<version>-<id>.meta
//! <base>json/cve/<version>/nvdcve-<version>-<id>.json.gz
//! ```
//!
//! [`FeedLocator`] builds those URLs from configuration; [`FeedClient`] owns
//! the HTTP client and performs the fetches (see [`metadata`] and
//! [`artifact`]). [`catalog`] enumerates the ids a run needs.

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::{Config, DigestScope, RetryConfig};
use crate::error::{Error, Result, TransportError};
use crate::types::ArtifactId;

pub mod artifact;
pub mod catalog;
pub mod metadata;

pub use artifact::ArtifactContent;
pub use catalog::{EPOCH_YEAR, build_catalog, current_year};
pub use metadata::ArtifactMetadata;

/// Builds feed URLs for one base location and format version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedLocator {
    base: String,
    version: String,
}

impl FeedLocator {
    /// Locator for `base_url` (a trailing `/` is added when missing) and `version`
    pub fn new(base_url: &str, version: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL {base_url:?}: {e}"), "feed.base_url"))?;

        let mut base = parsed.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            base,
            version: version.to_string(),
        })
    }

    /// Locator for the feed described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.feed.base_url, &config.feed.version)
    }

    /// Feed format version, e.g. `1.0`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// URL of the metadata descriptor for `artifact`
    pub fn metadata_url(&self, artifact: ArtifactId) -> String {
        format!("{}.meta", self.stem(artifact))
    }

    /// URL of the compressed data artifact for `artifact`
    pub fn artifact_url(&self, artifact: ArtifactId) -> String {
        format!("{}.json.gz", self.stem(artifact))
    }

    fn stem(&self, artifact: ArtifactId) -> String {
        format!(
            "{base}json/cve/{v}/nvdcve-{v}-{artifact}",
            base = self.base,
            v = self.version
        )
    }
}

/// HTTP access to the feed
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client` pools
/// connections across concurrent fetches.
#[derive(Clone, Debug)]
pub struct FeedClient {
    http: reqwest::Client,
    locator: FeedLocator,
    retry: RetryConfig,
    request_timeout: Duration,
    digest_scope: DigestScope,
}

impl FeedClient {
    /// Create a client for the feed described by `config`
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let locator = FeedLocator::from_config(config)?;

        let http = reqwest::Client::builder()
            .timeout(config.fetch.request_timeout)
            .connect_timeout(config.fetch.connect_timeout)
            .user_agent(config.fetch.user_agent.as_str())
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            http,
            locator,
            retry: config.retry.clone(),
            request_timeout: config.fetch.request_timeout,
            digest_scope: config.feed.digest_scope,
        })
    }

    /// URL builder used by this client
    pub fn locator(&self) -> &FeedLocator {
        &self.locator
    }

    /// Which bytes published digests cover
    pub fn digest_scope(&self) -> DigestScope {
        self.digest_scope
    }

    /// One GET attempt. Anything but `200 OK` is an error.
    async fn get(&self, artifact: ArtifactId, url: &str) -> Result<reqwest::Response> {
        tracing::debug!(artifact = %artifact, url, "GET");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(artifact, url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                artifact,
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response)
    }

    /// Classify a client error raised while sending or reading a body
    fn request_error(&self, artifact: ArtifactId, url: &str, source: reqwest::Error) -> Error {
        if source.is_timeout() {
            TransportError::Timeout {
                artifact,
                url: url.to_string(),
                timeout_secs: self.request_timeout.as_secs(),
            }
            .into()
        } else {
            TransportError::Request {
                artifact,
                url: url.to_string(),
                source,
            }
            .into()
        }
    }
}
