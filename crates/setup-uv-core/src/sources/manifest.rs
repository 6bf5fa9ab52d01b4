//! Manifest-backed version source.
//!
//! The whole document is fetched once and memoized in a [`ManifestCache`]
//! keyed by location. The cache is owned by the caller and can be cleared,
//! so separate runs (and tests) never share state by accident.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use setup_uv_schema::{Arch, ArtifactDescriptor, Manifest, Platform};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SourceError, VersionSource};

/// Parsed manifests keyed by URL or file path.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: Mutex<HashMap<String, Arc<Manifest>>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached manifest for `location`, fetching it on first use.
    pub async fn get_or_fetch(
        &self,
        client: &Client,
        location: &str,
    ) -> Result<Arc<Manifest>, SourceError> {
        let mut entries = self.entries.lock().await;
        if let Some(hit) = entries.get(location) {
            return Ok(Arc::clone(hit));
        }

        let text = read_location(client, location).await?;
        let manifest = Manifest::parse(&text)?;
        if manifest.skipped_lines > 0 {
            debug!(
                "Skipped {} unparseable manifest lines in {location}",
                manifest.skipped_lines
            );
        }
        debug!(
            "Loaded {} versions from {location}",
            manifest.records.len()
        );

        let manifest = Arc::new(manifest);
        entries.insert(location.to_string(), Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Forget every memoized manifest.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

async fn read_location(client: &Client, location: &str) -> Result<String, SourceError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        info!("Fetching version data from {location}");
        let resp = client
            .get(location)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        Ok(resp.text().await?)
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        debug!("Reading version data from {path}");
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Version source over a single manifest document.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    client: Client,
    location: String,
    cache: Arc<ManifestCache>,
}

impl ManifestSource {
    pub fn new(client: Client, location: impl Into<String>, cache: Arc<ManifestCache>) -> Self {
        Self {
            client,
            location: location.into(),
            cache,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn manifest(&self) -> Result<Arc<Manifest>, SourceError> {
        self.cache.get_or_fetch(&self.client, &self.location).await
    }
}

#[async_trait]
impl VersionSource for ManifestSource {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn list_versions(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.manifest().await?.versions())
    }

    async fn latest_version(&self) -> Result<String, SourceError> {
        self.manifest()
            .await?
            .latest()
            .map(str::to_string)
            .ok_or(SourceError::Exhausted)
    }

    async fn find_artifact(
        &self,
        version: &str,
        arch: Arch,
        platform: Platform,
    ) -> Result<Option<ArtifactDescriptor>, SourceError> {
        Ok(self.manifest().await?.find(version, arch, platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const BODY: &str = concat!(
        r#"{"version":"0.9.26","artifacts":[{"platform":"x86_64-unknown-linux-gnu","variant":"default","url":"https://example.com/uv-x86_64-unknown-linux-gnu.tar.gz","archive_format":"tar.gz","sha256":"fcf0a9ea6599c6ae28a4c854ac6da76f2c889354d7c36ce136ef071f7ab9721f"}]}"#,
        "\n",
        r#"{"version":"0.9.25","artifacts":[]}"#,
        "\n"
    );

    #[tokio::test]
    async fn fetches_once_per_location() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/uv.ndjson")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let cache = Arc::new(ManifestCache::new());
        let source = ManifestSource::new(
            Client::new(),
            format!("{}/uv.ndjson", server.url()),
            Arc::clone(&cache),
        );

        assert_eq!(source.latest_version().await.unwrap(), "0.9.26");
        assert_eq!(source.list_versions().await.unwrap(), vec!["0.9.26", "0.9.25"]);
        let found = source
            .find_artifact("0.9.26", Arch::X86_64, Platform::LinuxGnu)
            .await
            .unwrap()
            .unwrap();
        assert!(found.checksum.is_some());

        mock.assert_async().await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/uv.ndjson")
            .with_status(200)
            .with_body(BODY)
            .expect(2)
            .create_async()
            .await;

        let cache = Arc::new(ManifestCache::new());
        let source = ManifestSource::new(
            Client::new(),
            format!("{}/uv.ndjson", server.url()),
            Arc::clone(&cache),
        );
        source.list_versions().await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
        source.list_versions().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv.ndjson")
            .with_status(500)
            .create_async()
            .await;

        let source = ManifestSource::new(
            Client::new(),
            format!("{}/uv.ndjson", server.url()),
            Arc::new(ManifestCache::new()),
        );
        let err = source.list_versions().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch version data: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn local_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uv.ndjson");
        std::fs::write(&path, BODY).unwrap();

        let source = ManifestSource::new(
            Client::new(),
            path.to_string_lossy(),
            Arc::new(ManifestCache::new()),
        );
        assert_eq!(source.latest_version().await.unwrap(), "0.9.26");
        assert!(
            source
                .find_artifact("0.9.25", Arch::X86_64, Platform::LinuxGnu)
                .await
                .unwrap()
                .is_none()
        );
    }
}
