//! Version manifest documents.
//!
//! Two shapes are accepted:
//!
//! * NDJSON, one [`VersionRecord`] per line, newest first:
//!   `{"version":"0.9.26","artifacts":[{"platform":"aarch64-apple-darwin",...}]}`
//! * A legacy JSON array of flat entries
//!   `[{"version","artifactName","arch","platform","downloadUrl","checksum"?}]`,
//!   grouped by version on load.
//!
//! Either way the parsed [`Manifest`] is sorted newest first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ArchiveFormat, ArtifactDescriptor, Arch, Platform, split_target};

/// Errors from parsing a manifest document.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The legacy array form was not valid JSON.
    #[error("Invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable record was found in the document.
    #[error("No version data found in manifest")]
    Empty,
}

/// One released version and every build published for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version tag, without a leading `v`.
    pub version: String,
    /// Builds for this version.
    #[serde(default)]
    pub artifacts: Vec<ManifestArtifact>,
}

/// One build within a [`VersionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArtifact {
    /// Full target triple, e.g. `x86_64-unknown-linux-gnu`.
    pub platform: String,
    /// Build variant; `None` and `"default"` both mean the standard build.
    #[serde(default)]
    pub variant: Option<String>,
    /// Download URL.
    pub url: String,
    /// Archive extension (`tar.gz` / `zip`); guessed from `url` when absent.
    #[serde(default)]
    pub archive_format: Option<String>,
    /// Published SHA-256 of the archive.
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ManifestArtifact {
    fn is_default_variant(&self) -> bool {
        self.variant.as_deref().is_none_or(|v| v == "default")
    }

    fn format(&self) -> Option<ArchiveFormat> {
        self.archive_format
            .as_deref()
            .and_then(|f| f.parse().ok())
            .or_else(|| ArchiveFormat::from_filename(&self.url))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    version: String,
    artifact_name: String,
    arch: String,
    platform: String,
    download_url: String,
    #[serde(default)]
    checksum: Option<String>,
}

/// A parsed manifest, newest version first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Version records, newest first.
    pub records: Vec<VersionRecord>,
    /// NDJSON lines that could not be parsed and were skipped.
    pub skipped_lines: usize,
}

impl Manifest {
    /// Parse a manifest document in either supported shape.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Json`] if a legacy array is malformed and
    /// [`ManifestError::Empty`] if no record could be read.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut manifest = if text.trim_start().starts_with('[') {
            Self::parse_legacy(text)?
        } else {
            Self::parse_ndjson(text)
        };

        if manifest.records.is_empty() {
            return Err(ManifestError::Empty);
        }

        sort_newest_first(&mut manifest.records);
        Ok(manifest)
    }

    fn parse_ndjson(text: &str) -> Self {
        let mut records = Vec::new();
        let mut skipped_lines = 0;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<VersionRecord>(line) {
                Ok(record) => records.push(record),
                Err(_) => skipped_lines += 1,
            }
        }

        Self {
            records,
            skipped_lines,
        }
    }

    fn parse_legacy(text: &str) -> Result<Self, ManifestError> {
        let entries: Vec<LegacyEntry> = serde_json::from_str(text)?;
        let mut records: Vec<VersionRecord> = Vec::new();

        for entry in entries {
            let artifact = ManifestArtifact {
                platform: format!("{}-{}", entry.arch, entry.platform),
                variant: None,
                archive_format: ArchiveFormat::from_filename(&entry.artifact_name)
                    .map(|f| f.extension().to_string()),
                url: entry.download_url,
                sha256: entry.checksum,
            };
            match records.iter_mut().find(|r| r.version == entry.version) {
                Some(record) => record.artifacts.push(artifact),
                None => records.push(VersionRecord {
                    version: entry.version,
                    artifacts: vec![artifact],
                }),
            }
        }

        Ok(Self {
            records,
            skipped_lines: 0,
        })
    }

    /// All version tags, newest first.
    pub fn versions(&self) -> Vec<String> {
        self.records.iter().map(|r| r.version.clone()).collect()
    }

    /// The newest version tag.
    pub fn latest(&self) -> Option<&str> {
        self.records.first().map(|r| r.version.as_str())
    }

    /// Locate the default build for a (version, arch, platform) combination.
    ///
    /// The published digest is passed through untouched; a blank one counts
    /// as absent.
    pub fn find(&self, version: &str, arch: Arch, platform: Platform) -> Option<ArtifactDescriptor> {
        let record = self.records.iter().find(|r| r.version == version)?;
        record
            .artifacts
            .iter()
            .filter(|a| a.is_default_variant())
            .find(|a| split_target(&a.platform) == Some((arch, platform)))
            .and_then(|a| {
                Some(ArtifactDescriptor {
                    version: record.version.clone(),
                    arch,
                    platform,
                    url: a.url.clone(),
                    format: a.format()?,
                    checksum: a
                        .sha256
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                })
            })
    }
}

/// Sort by semantic version, newest first; unparseable tags sink to the end
/// in their original relative order.
fn sort_newest_first(records: &mut [VersionRecord]) {
    records.sort_by(|a, b| {
        let va = semver::Version::parse(a.version.trim_start_matches('v')).ok();
        let vb = semver::Version::parse(b.version.trim_start_matches('v')).ok();
        match (va, vb) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}
