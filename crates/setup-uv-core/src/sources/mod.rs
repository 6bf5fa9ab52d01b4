//! Version data sources.
//!
//! A source answers two questions: which versions exist (newest first), and
//! where the build for one (version, arch, platform) lives. The resolver and
//! acquirer only see [`VersionSource`]; [`SourceChain`] layers several of them
//! with ordered fallback.

pub mod github;
pub mod manifest;

use async_trait::async_trait;
use setup_uv_schema::{Arch, ArtifactDescriptor, ManifestError, Platform};
use thiserror::Error;
use tracing::{debug, warn};

pub use github::GitHubSource;
pub use manifest::{ManifestCache, ManifestSource};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch version data: {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("No version data available from any source")]
    Exhausted,
}

/// Something that knows which versions exist and where to download them.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Short identifier used in log messages.
    fn name(&self) -> &str;

    /// Every known version tag, newest first.
    async fn list_versions(&self) -> Result<Vec<String>, SourceError>;

    /// The newest version tag.
    async fn latest_version(&self) -> Result<String, SourceError> {
        self.list_versions()
            .await?
            .into_iter()
            .next()
            .ok_or(SourceError::Exhausted)
    }

    /// Locate the build for one combination. `Ok(None)` means "not here".
    async fn find_artifact(
        &self,
        version: &str,
        arch: Arch,
        platform: Platform,
    ) -> Result<Option<ArtifactDescriptor>, SourceError>;
}

/// Ordered list of sources; each call walks them until one answers.
pub struct SourceChain {
    sources: Vec<Box<dyn VersionSource>>,
}

impl std::fmt::Debug for SourceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("SourceChain").field("sources", &names).finish()
    }
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn VersionSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl VersionSource for SourceChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn list_versions(&self) -> Result<Vec<String>, SourceError> {
        let mut last_err = SourceError::Exhausted;
        for source in &self.sources {
            match source.list_versions().await {
                Ok(versions) if !versions.is_empty() => return Ok(versions),
                Ok(_) => debug!("{} returned no versions", source.name()),
                Err(e) => {
                    warn!("{} failed to list versions: {e}", source.name());
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn latest_version(&self) -> Result<String, SourceError> {
        let mut last_err = SourceError::Exhausted;
        for source in &self.sources {
            match source.latest_version().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!("{} failed to report the latest version: {e}", source.name());
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn find_artifact(
        &self,
        version: &str,
        arch: Arch,
        platform: Platform,
    ) -> Result<Option<ArtifactDescriptor>, SourceError> {
        for source in &self.sources {
            match source.find_artifact(version, arch, platform).await {
                Ok(Some(found)) => {
                    debug!("{} has {version} for {arch}-{platform}", source.name());
                    return Ok(Some(found));
                }
                Ok(None) => debug!("{} has no {version} for {arch}-{platform}", source.name()),
                Err(e) => warn!("{} lookup failed, trying next source: {e}", source.name()),
            }
        }
        Ok(None)
    }
}

/// In-memory source for tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use setup_uv_schema::ArchiveFormat;

    pub(crate) struct FakeSource {
        pub versions: Vec<String>,
        pub fail: bool,
    }

    impl FakeSource {
        pub(crate) fn new(versions: &[&str]) -> Self {
            Self {
                versions: versions.iter().map(ToString::to_string).collect(),
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                versions: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl VersionSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn list_versions(&self) -> Result<Vec<String>, SourceError> {
            if self.fail {
                return Err(SourceError::Api("boom".into()));
            }
            Ok(self.versions.clone())
        }

        async fn find_artifact(
            &self,
            version: &str,
            arch: Arch,
            platform: Platform,
        ) -> Result<Option<ArtifactDescriptor>, SourceError> {
            if self.fail {
                return Err(SourceError::Api("boom".into()));
            }
            if !self.versions.iter().any(|v| v == version) {
                return Ok(None);
            }
            Ok(Some(ArtifactDescriptor {
                version: version.to_string(),
                arch,
                platform,
                url: format!("https://fake.invalid/{version}/uv-{arch}-{platform}.tar.gz"),
                format: ArchiveFormat::TarGz,
                checksum: None,
            }))
        }
    }
}
