//! Release-listing version source backed by the GitHub REST API.
//!
//! Asset names follow `uv-<arch>-<platform>.<ext>`; checksum assets add a
//! `.sha256` suffix. A rejected token is retried once anonymously.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use setup_uv_schema::{Arch, ArchiveFormat, ArtifactDescriptor, Platform, split_target};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{SourceError, VersionSource};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Suffix identifying checksum assets.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

const PER_PAGE: usize = 100;

/// A release as returned by the releases API.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<AssetInfo>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Build a GitHub client, authenticated when a token is given.
///
/// Proxy settings are picked up from `HTTP(S)_PROXY` by reqwest.
pub fn build_github_client(token: Option<&str>) -> Result<Client, SourceError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(crate::USER_AGENT),
    );
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/vnd.github+json"),
    );

    if let Some(t) = token.filter(|t| !t.is_empty()) {
        let value = header::HeaderValue::from_str(&format!("Bearer {t}"))
            .map_err(|e| SourceError::Api(format!("invalid token: {e}")))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(Client::builder().default_headers(headers).build()?)
}

/// Parse `uv-<arch>-<platform>.<ext>` into its parts.
pub fn parse_asset_name(name: &str) -> Option<(Arch, Platform, ArchiveFormat)> {
    let format = ArchiveFormat::from_filename(name)?;
    let stem = name
        .strip_prefix(&format!("{}-", setup_uv_schema::TOOL_NAME))?
        .strip_suffix(&format!(".{}", format.extension()))?;
    let (arch, platform) = split_target(stem)?;
    Some((arch, platform, format))
}

/// Conventional release download URL for one build.
pub fn release_download_url(version: &str, arch: Arch, platform: Platform) -> String {
    format!(
        "https://github.com/{}/{}/releases/download/{version}/{}-{arch}-{platform}.{}",
        setup_uv_schema::OWNER,
        setup_uv_schema::REPO,
        setup_uv_schema::TOOL_NAME,
        platform.archive_format().extension()
    )
}

/// First whitespace-separated token of a `.sha256` file.
pub fn parse_checksum_file(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

#[derive(Debug)]
pub struct GitHubSource {
    client: Client,
    anonymous: Client,
    authenticated: bool,
    api_base: String,
    owner: String,
    repo: String,
    releases: OnceCell<Vec<ReleaseInfo>>,
    warned_anonymous: AtomicBool,
}

impl GitHubSource {
    pub fn new(token: Option<&str>) -> Result<Self, SourceError> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: Option<&str>, api_base: &str) -> Result<Self, SourceError> {
        let authenticated = token.is_some_and(|t| !t.is_empty());
        Ok(Self {
            client: build_github_client(token)?,
            anonymous: build_github_client(None)?,
            authenticated,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: setup_uv_schema::OWNER.to_string(),
            repo: setup_uv_schema::REPO.to_string(),
            releases: OnceCell::new(),
            warned_anonymous: AtomicBool::new(false),
        })
    }

    /// Point at another repository (used by tests and mirrors).
    pub fn with_repo(mut self, owner: &str, repo: &str) -> Self {
        self.owner = owner.to_string();
        self.repo = repo.to_string();
        self
    }

    fn warn_anonymous(&self) {
        if !self.warned_anonymous.swap(true, Ordering::Relaxed) {
            warn!("No (valid) GitHub token provided. Falling back to anonymous. Requests might be rate limited.");
        }
    }

    /// GET with one anonymous retry on a rejected token.
    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        if !self.authenticated {
            self.warn_anonymous();
            return Ok(self.anonymous.get(url).send().await?);
        }

        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.warn_anonymous();
            return Ok(self.anonymous.get(url).send().await?);
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, bool), SourceError> {
        let resp = self.get(url).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api(format!("{status} for {url}: {}", body.trim())));
        }
        let has_next = resp
            .headers()
            .get(header::LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|link| link.contains("rel=\"next\""));
        Ok((resp.json().await?, has_next))
    }

    /// Every release, newest first, following pagination.
    pub async fn list_releases(&self) -> Result<&[ReleaseInfo], SourceError> {
        let releases = self
            .releases
            .get_or_try_init(|| async {
                let mut all = Vec::new();
                let mut page = 1;
                loop {
                    let url = format!(
                        "{}/repos/{}/{}/releases?per_page={PER_PAGE}&page={page}",
                        self.api_base, self.owner, self.repo
                    );
                    let (batch, has_next): (Vec<ReleaseInfo>, bool) = self.get_json(&url).await?;
                    let done = batch.is_empty() || !has_next;
                    all.extend(batch);
                    if done {
                        break;
                    }
                    page += 1;
                }
                debug!("Listed {} releases of {}/{}", all.len(), self.owner, self.repo);
                Ok::<_, SourceError>(all)
            })
            .await?;
        Ok(releases)
    }

    /// A single release by tag; `None` when the tag does not exist.
    pub async fn release_by_tag(&self, tag: &str) -> Result<Option<ReleaseInfo>, SourceError> {
        if let Some(cached) = self.releases.get() {
            return Ok(cached.iter().find(|r| r.tag_name == tag).cloned());
        }
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{tag}",
            self.api_base, self.owner, self.repo
        );
        let resp = self.get(&url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!("{} for {url}", resp.status())));
        }
        Ok(Some(resp.json().await?))
    }

    /// Download a small text asset (checksum files).
    pub async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let resp = self.get(url).await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl VersionSource for GitHubSource {
    fn name(&self) -> &str {
        "github-releases"
    }

    async fn list_versions(&self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .list_releases()
            .await?
            .iter()
            .map(|r| r.tag_name.clone())
            .collect())
    }

    async fn latest_version(&self) -> Result<String, SourceError> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, self.owner, self.repo
        );
        let (latest, _): (ReleaseInfo, bool) = self.get_json(&url).await?;
        debug!("Latest release: {}", latest.tag_name);
        Ok(latest.tag_name)
    }

    async fn find_artifact(
        &self,
        version: &str,
        arch: Arch,
        platform: Platform,
    ) -> Result<Option<ArtifactDescriptor>, SourceError> {
        let Some(release) = self.release_by_tag(version).await? else {
            return Ok(None);
        };

        let Some((asset, format)) = release.assets.iter().find_map(|a| {
            parse_asset_name(&a.name)
                .filter(|(a_arch, a_platform, _)| *a_arch == arch && *a_platform == platform)
                .map(|(_, _, format)| (a, format))
        }) else {
            return Ok(None);
        };

        let checksum_name = format!("{}{CHECKSUM_SUFFIX}", asset.name);
        let checksum = match release.assets.iter().find(|a| a.name == checksum_name) {
            Some(sum) => match self.fetch_text(&sum.download_url).await {
                Ok(text) => parse_checksum_file(&text).map(str::to_string),
                Err(e) => {
                    info!("Could not fetch {checksum_name}: {e}");
                    None
                }
            },
            None => None,
        };

        Ok(Some(ArtifactDescriptor {
            version: release.tag_name.clone(),
            arch,
            platform,
            url: asset.download_url.clone(),
            format,
            checksum,
        }))
    }
}
