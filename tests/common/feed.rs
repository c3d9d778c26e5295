//! Mock NVD feed server

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nvd_search::{ArtifactId, Config, DigestScope};

use super::fixtures::{descriptor, feed_document, gzip, published_sha256};

const VERSION: &str = "1.1";

/// Wiremock server publishing a feed tree under `/feeds/`
pub struct MockFeed {
    pub server: MockServer,
    scope: DigestScope,
}

impl MockFeed {
    /// Feed whose descriptors hash the compressed artifact
    pub async fn start() -> Self {
        Self::with_scope(DigestScope::Compressed).await
    }

    /// Feed whose descriptors hash according to `scope`
    pub async fn with_scope(scope: DigestScope) -> Self {
        Self {
            server: MockServer::start().await,
            scope,
        }
    }

    /// Configuration for a synchronizer talking to this feed
    pub fn config(&self, store: &std::path::Path) -> Config {
        let mut config = Config::with_store(store);
        config.feed.base_url = format!("{}/feeds/", self.server.uri());
        config.feed.version = VERSION.to_string();
        config.feed.digest_scope = self.scope;
        config.fetch.max_concurrent_fetches = 3;
        config.retry.max_attempts = 2;
        config.retry.initial_delay = std::time::Duration::from_millis(5);
        config.retry.jitter = false;
        config.disk_space.enabled = false;
        config
    }

    fn file_path(artifact: ArtifactId, extension: &str) -> String {
        format!("/feeds/json/cve/{VERSION}/nvdcve-{VERSION}-{artifact}.{extension}")
    }

    /// Publish `items` under `artifact` with a correct descriptor
    pub async fn publish(&self, artifact: ArtifactId, items: &[Value]) {
        let json = feed_document(items);
        let gz = gzip(&json);
        let hashed = match self.scope {
            DigestScope::Compressed => &gz,
            DigestScope::Uncompressed => &json,
        };
        let meta = descriptor(
            "2024-01-02T03:00:00-05:00",
            json.len(),
            gz.len(),
            &published_sha256(hashed),
        );

        Mock::given(method("GET"))
            .and(path(Self::file_path(artifact, "meta")))
            .respond_with(ResponseTemplate::new(200).set_body_string(meta))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(Self::file_path(artifact, "json.gz")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gz))
            .mount(&self.server)
            .await;
    }

    /// Forget every published artifact and recorded request
    pub async fn clear(&self) {
        self.server.reset().await;
    }

    /// Paths requested so far, in arrival order
    pub async fn requested_paths(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }
}
