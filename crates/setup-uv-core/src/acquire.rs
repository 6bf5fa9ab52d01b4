//! Artifact acquisition: locate, download, verify, extract, install.
//!
//! One acquisition walks
//! `Idle -> UrlDetermined -> Downloading -> Downloaded -> Validating ->
//! Validated | Failed -> Extracting -> Installed`.
//! The tool cache only sees the result once every earlier step succeeded.

use std::path::{Path, PathBuf};

use setup_uv_schema::{Arch, ArchiveFormat, ArtifactDescriptor, InstalledTool, Platform, TOOL_NAME};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum::{ChecksumError, validate_checksum};
use crate::io::download::{DownloadError, Downloader};
use crate::io::extract::{ExtractError, extract};
use crate::sources::VersionSource;
use crate::sources::github::release_download_url;
use crate::tool_cache::{ToolCache, ToolCacheError};

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Failed to download uv from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error("Failed to extract {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("Failed to install into the tool cache: {0}")]
    ToolCache(#[from] ToolCacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    Idle,
    UrlDetermined,
    Downloading,
    Downloaded,
    Validating,
    Validated,
    Failed,
    Extracting,
    Installed,
}

/// What to acquire.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    pub version: &'a str,
    pub arch: Arch,
    pub platform: Platform,
    /// User-supplied checksum; outranks every other digest.
    pub checksum: Option<&'a str>,
}

pub struct Acquirer<'a> {
    source: &'a dyn VersionSource,
    downloader: Downloader,
    token: Option<String>,
    tool_cache: ToolCache,
    scratch_root: PathBuf,
    state: AcquireState,
}

impl std::fmt::Debug for Acquirer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("source", &self.source.name())
            .field("tool_cache", &self.tool_cache)
            .field("scratch_root", &self.scratch_root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> Acquirer<'a> {
    pub fn new(source: &'a dyn VersionSource, downloader: Downloader, tool_cache: ToolCache) -> Self {
        Self {
            source,
            downloader,
            token: None,
            tool_cache,
            scratch_root: crate::runner_temp(),
            state: AcquireState::Idle,
        }
    }

    /// Credential sent with downloads from github.com.
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    /// Where downloads and extractions are staged.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn state(&self) -> AcquireState {
        self.state
    }

    fn transition(&mut self, next: AcquireState) {
        debug!("Acquisition: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Where to download from: the first source with an answer, else the
    /// conventional release URL.
    pub async fn determine_artifact(
        &self,
        version: &str,
        arch: Arch,
        platform: Platform,
    ) -> ArtifactDescriptor {
        match self.source.find_artifact(version, arch, platform).await {
            Ok(Some(found)) => return found,
            Ok(None) => debug!("No version data for {version} ({arch}-{platform})"),
            Err(e) => warn!("Version data lookup failed: {e}"),
        }
        ArtifactDescriptor {
            version: version.to_string(),
            arch,
            platform,
            url: release_download_url(version, arch, platform),
            format: platform.archive_format(),
            checksum: None,
        }
    }

    /// Download, verify and install one build.
    ///
    /// # Errors
    ///
    /// Any failure leaves the tool cache untouched and the state at
    /// [`AcquireState::Failed`].
    pub async fn acquire(&mut self, req: AcquireRequest<'_>) -> Result<InstalledTool, AcquireError> {
        self.transition(AcquireState::Idle);
        let result = self.run(req).await;
        if result.is_err() {
            self.transition(AcquireState::Failed);
        }
        result
    }

    async fn run(&mut self, req: AcquireRequest<'_>) -> Result<InstalledTool, AcquireError> {
        let artifact = self.determine_artifact(req.version, req.arch, req.platform).await;
        self.transition(AcquireState::UrlDetermined);
        info!("Downloading uv from \"{}\" ...", artifact.url);

        tokio::fs::create_dir_all(&self.scratch_root).await?;
        let scratch = tempfile::Builder::new()
            .prefix("setup-uv-")
            .tempdir_in(&self.scratch_root)?;
        let archive = scratch.path().join(artifact.file_name());

        self.transition(AcquireState::Downloading);
        let downloader = if is_github_url(&artifact.url) {
            self.downloader.clone().with_token(self.token.as_deref())
        } else {
            self.downloader.clone()
        };
        downloader
            .download(&artifact.url, &archive)
            .await
            .map_err(|source| AcquireError::Download {
                url: artifact.url.clone(),
                source,
            })?;
        self.transition(AcquireState::Downloaded);

        self.transition(AcquireState::Validating);
        validate_checksum(
            req.checksum,
            &archive,
            req.arch,
            req.platform,
            req.version,
            artifact.checksum.as_deref(),
        )
        .await?;
        self.transition(AcquireState::Validated);

        self.transition(AcquireState::Extracting);
        let extract_dir = scratch.path().join("extracted");
        let files = extract(&archive, artifact.format, &extract_dir)
            .await
            .map_err(|source| AcquireError::Extract {
                path: archive.clone(),
                source,
            })?;
        debug!("Extracted {} files", files.len());
        let tool_dir = tool_root(&extract_dir, artifact.format, req.arch, req.platform);

        let cache = self.tool_cache.clone();
        let version = req.version.to_string();
        let arch = req.arch;
        let installed = tokio::task::spawn_blocking(move || {
            cache.cache_dir(&tool_dir, TOOL_NAME, &version, arch)
        })
        .await
        .map_err(std::io::Error::other)??;

        self.transition(AcquireState::Installed);
        info!("Installed uv {} to {}", installed.version, installed.path.display());
        Ok(installed)
    }
}

/// Tarballs wrap the executables in `uv-<arch>-<platform>/`; zips do not.
fn tool_root(extract_dir: &Path, format: ArchiveFormat, arch: Arch, platform: Platform) -> PathBuf {
    if format == ArchiveFormat::Zip {
        return extract_dir.to_path_buf();
    }
    let nested = extract_dir.join(format!("{TOOL_NAME}-{arch}-{platform}"));
    if nested.is_dir() {
        nested
    } else {
        extract_dir.to_path_buf()
    }
}

fn is_github_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "github.com" || h.ends_with(".github.com")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::download::RetryPolicy;
    use crate::sources::SourceError;
    use async_trait::async_trait;
    use mockito::Server;
    use sha2::{Digest, Sha256};
    use std::time::Duration;
    use tempfile::tempdir;

    const VERSION: &str = "0.0.1-test";

    struct StaticSource(Option<ArtifactDescriptor>);

    #[async_trait]
    impl VersionSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn list_versions(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.0.iter().map(|a| a.version.clone()).collect())
        }

        async fn find_artifact(
            &self,
            _version: &str,
            _arch: Arch,
            _platform: Platform,
        ) -> Result<Option<ArtifactDescriptor>, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn tarball() -> Vec<u8> {
        let enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for name in ["uv", "uvx"] {
            let mut header = tar::Header::new_gnu();
            header.set_size(2);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("uv-x86_64-unknown-linux-gnu/{name}"), &b"#!"[..])
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn descriptor(url: String, checksum: Option<&str>) -> ArtifactDescriptor {
        ArtifactDescriptor {
            version: VERSION.into(),
            arch: Arch::X86_64,
            platform: Platform::LinuxGnu,
            url,
            format: ArchiveFormat::TarGz,
            checksum: checksum.map(str::to_string),
        }
    }

    fn downloader() -> Downloader {
        Downloader::new(reqwest::Client::new()).with_policy(RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            socket_timeout: Duration::from_secs(5),
        })
    }

    fn request(checksum: Option<&str>) -> AcquireRequest<'_> {
        AcquireRequest {
            version: VERSION,
            arch: Arch::X86_64,
            platform: Platform::LinuxGnu,
            checksum,
        }
    }

    #[tokio::test]
    async fn installs_and_is_found_by_lookup() {
        let body = tarball();
        let digest = hex::encode(Sha256::digest(&body));
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv-x86_64-unknown-linux-gnu.tar.gz")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let cache_root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let source = StaticSource(Some(descriptor(
            format!("{}/uv-x86_64-unknown-linux-gnu.tar.gz", server.url()),
            Some(&digest),
        )));
        let cache = ToolCache::new(cache_root.path());
        let mut acquirer =
            Acquirer::new(&source, downloader(), cache.clone()).with_scratch_root(scratch.path());

        let installed = acquirer.acquire(request(None)).await.unwrap();
        assert_eq!(acquirer.state(), AcquireState::Installed);
        assert!(installed.path.join("uv").is_file());
        assert!(installed.path.join("uvx").is_file());

        let hit = cache.try_get_cached(TOOL_NAME, Arch::X86_64, VERSION, Default::default());
        assert_eq!(hit.path, Some(installed.path));
    }

    #[tokio::test]
    async fn checksum_mismatch_installs_nothing() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv.tar.gz")
            .with_status(200)
            .with_body(tarball())
            .create_async()
            .await;

        let cache_root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let source = StaticSource(Some(descriptor(format!("{}/uv.tar.gz", server.url()), None)));
        let cache = ToolCache::new(cache_root.path());
        let mut acquirer =
            Acquirer::new(&source, downloader(), cache.clone()).with_scratch_root(scratch.path());

        let err = acquirer.acquire(request(Some("abc123"))).await.unwrap_err();
        assert!(matches!(err, AcquireError::Checksum(ChecksumError::Mismatch { .. })));
        assert!(err.to_string().contains("abc123"));
        assert_eq!(acquirer.state(), AcquireState::Failed);
        assert!(cache.find_all_versions(TOOL_NAME, Arch::X86_64).is_empty());
    }

    #[tokio::test]
    async fn malformed_published_checksum_rejects_the_archive() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv.tar.gz")
            .with_status(200)
            .with_body(tarball())
            .create_async()
            .await;

        let cache_root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let source = StaticSource(Some(descriptor(
            format!("{}/uv.tar.gz", server.url()),
            Some("deadbeef"),
        )));
        let cache = ToolCache::new(cache_root.path());
        let mut acquirer =
            Acquirer::new(&source, downloader(), cache.clone()).with_scratch_root(scratch.path());

        let err = acquirer.acquire(request(None)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Checksum(ChecksumError::Mismatch { .. })));
        assert!(cache.find_all_versions(TOOL_NAME, Arch::X86_64).is_empty());
    }

    #[tokio::test]
    async fn download_failure_names_the_url() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/gone.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let scratch = tempdir().unwrap();
        let cache_root = tempdir().unwrap();
        let url = format!("{}/gone.tar.gz", server.url());
        let source = StaticSource(Some(descriptor(url.clone(), None)));
        let mut acquirer = Acquirer::new(&source, downloader(), ToolCache::new(cache_root.path()))
            .with_scratch_root(scratch.path());

        let err = acquirer.acquire(request(None)).await.unwrap_err();
        assert!(err.to_string().contains(&url));
        assert_eq!(acquirer.state(), AcquireState::Failed);
    }

    #[tokio::test]
    async fn missing_data_falls_back_to_release_url() {
        let source = StaticSource(None);
        let cache_root = tempdir().unwrap();
        let acquirer = Acquirer::new(&source, downloader(), ToolCache::new(cache_root.path()));
        let artifact = acquirer
            .determine_artifact("0.9.26", Arch::X86_64, Platform::WindowsMsvc)
            .await;
        assert_eq!(
            artifact.url,
            "https://github.com/astral-sh/uv/releases/download/0.9.26/uv-x86_64-pc-windows-msvc.zip"
        );
        assert_eq!(artifact.format, ArchiveFormat::Zip);
        assert!(artifact.checksum.is_none());
    }

    #[test]
    fn token_only_goes_to_github() {
        assert!(is_github_url("https://github.com/astral-sh/uv/releases/download/x"));
        assert!(is_github_url("https://objects.github.com/x"));
        assert!(!is_github_url("https://mirror.example.com/github.com/x"));
        assert!(!is_github_url("not a url"));
    }
}
