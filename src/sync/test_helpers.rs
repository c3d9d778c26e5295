//! Shared fixtures for synchronization tests

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, RetryConfig};
use crate::types::ArtifactId;

/// Gzip `data`
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Lowercase hex SHA-256 of `data`
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Minimal NVD 1.x CVE item
pub(crate) fn cve_item(id: &str, summary: &str) -> Value {
    json!({
        "cve": {
            "data_type": "CVE",
            "CVE_data_meta": { "ID": id, "ASSIGNER": "cve@mitre.org" },
            "description": {
                "description_data": [ { "lang": "en", "value": summary } ]
            }
        },
        "publishedDate": "2002-01-01T05:00Z"
    })
}

/// Feed document wrapping `items`
pub(crate) fn feed_document(items: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "CVE_data_type": "CVE",
        "CVE_data_format": "MITRE",
        "CVE_data_version": "4.0",
        "CVE_data_numberOfCVEs": items.len().to_string(),
        "CVE_Items": items,
    }))
    .unwrap()
}

/// Summary text of `id` in a dataset item map
pub(crate) fn summary_of(items: &BTreeMap<String, Value>, id: &str) -> Option<String> {
    items.get(id)?["cve"]["description"]["description_data"][0]["value"]
        .as_str()
        .map(str::to_string)
}

/// Configuration pointing at `feed` with fast retries and no disk pre-flight
pub(crate) fn test_config(feed: &MockFeed, store: &Path) -> Config {
    let mut config = Config::with_store(store);
    config.feed.base_url = feed.base_url();
    config.fetch.max_concurrent_fetches = 4;
    config.fetch.request_timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.disk_space.enabled = false;
    config
}

/// Every file under `root` with its contents
pub(crate) fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, std::fs::read(entry.path()).unwrap())
        })
        .collect()
}

/// A feed served by wiremock under `/feeds/`
pub(crate) struct MockFeed {
    pub(crate) server: MockServer,
}

impl MockFeed {
    pub(crate) async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("{}/feeds/", self.server.uri())
    }

    fn meta_path(artifact: ArtifactId) -> String {
        format!("/feeds/json/cve/1.0/nvdcve-1.0-{artifact}.meta")
    }

    fn gz_path(artifact: ArtifactId) -> String {
        format!("/feeds/json/cve/1.0/nvdcve-1.0-{artifact}.json.gz")
    }

    /// Publish `items` as `artifact` with a matching descriptor
    pub(crate) async fn publish(&self, artifact: ArtifactId, items: &[Value]) {
        let json = feed_document(items);
        let gz = gzip(&json);
        let digest = sha256_hex(&gz).to_uppercase();
        self.publish_with_digest(artifact, &gz, json.len(), &digest)
            .await;
    }

    /// Publish `items` as `artifact` with a descriptor that lies about the digest
    pub(crate) async fn publish_corrupt(&self, artifact: ArtifactId, items: &[Value]) {
        let json = feed_document(items);
        let gz = gzip(&json);
        let wrong = sha256_hex(b"something else entirely");
        self.publish_with_digest(artifact, &gz, json.len(), &wrong)
            .await;
    }

    /// Serve `body` verbatim as the data file of `artifact`, with a
    /// descriptor whose digest covers those exact bytes
    pub(crate) async fn publish_raw(&self, artifact: ArtifactId, body: &[u8]) {
        self.publish_with_digest(artifact, body, body.len(), &sha256_hex(body))
            .await;
    }

    async fn publish_with_digest(&self, artifact: ArtifactId, gz: &[u8], size: usize, digest: &str) {
        let descriptor = format!(
            "lastModifiedDate:2024-01-0{day}T03:00:00-05:00\r\n\
             size:{size}\r\n\
             zipSize:{zip}\r\n\
             gzSize:{gz_size}\r\n\
             sha256:{digest}\r\n",
            day = 1 + (artifact.is_modified() as u8),
            zip = gz.len() + 100,
            gz_size = gz.len(),
        );
        self.publish_meta(artifact, &descriptor).await;

        Mock::given(method("GET"))
            .and(path(Self::gz_path(artifact)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gz.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Serve `body` as the descriptor of `artifact`
    pub(crate) async fn publish_meta(&self, artifact: ArtifactId, body: &str) {
        Mock::given(method("GET"))
            .and(path(Self::meta_path(artifact)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(&self.server)
            .await;
    }

    /// Answer `status` for the descriptor of `artifact`
    pub(crate) async fn fail_meta(&self, artifact: ArtifactId, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::meta_path(artifact)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drop every published artifact
    pub(crate) async fn clear(&self) {
        self.server.reset().await;
    }

    /// Number of requests received for the descriptor of `artifact`
    pub(crate) async fn meta_requests(&self, artifact: ArtifactId) -> usize {
        self.requests_to(&Self::meta_path(artifact)).await
    }

    /// Number of requests received for the data file of `artifact`
    pub(crate) async fn artifact_requests(&self, artifact: ArtifactId) -> usize {
        self.requests_to(&Self::gz_path(artifact)).await
    }

    async fn requests_to(&self, wanted: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == wanted)
            .count()
    }
}
