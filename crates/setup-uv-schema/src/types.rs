use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Arch, Platform};

/// Archive format of a downloadable release build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (`.tar.gz`).
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zip archive (`.zip`).
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }

    /// Guess the format from a file name or URL path.
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "zip" => Ok(Self::Zip),
            _ => Err(format!("Unknown archive format: {s}")),
        }
    }
}

/// Tie-break policy when several known versions satisfy a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Pick the newest satisfying version.
    #[default]
    Highest,
    /// Pick the oldest satisfying version.
    Lowest,
}

impl ResolutionStrategy {
    /// Input-value representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::Lowest => "lowest",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    /// An empty value selects the default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "highest" => Ok(Self::Highest),
            "lowest" => Ok(Self::Lowest),
            other => Err(format!(
                "Invalid resolution-strategy: {other}. Must be 'highest' or 'lowest'."
            )),
        }
    }
}

/// Where and how to download one release build.
///
/// A data source returning no descriptor for a (version, arch, platform)
/// combination is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Concrete version tag (e.g. `0.9.26`).
    pub version: String,
    /// Target architecture.
    pub arch: Arch,
    /// Target platform triple.
    pub platform: Platform,
    /// Absolute download URL.
    pub url: String,
    /// Archive format of the download.
    pub format: ArchiveFormat,
    /// Digest published alongside the artifact, as published.
    ///
    /// Kept verbatim: a malformed value must still fail validation rather
    /// than read as "no checksum".
    pub checksum: Option<String>,
}

impl ArtifactDescriptor {
    /// File name component of the download URL.
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// A completed entry in the local tool cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledTool {
    /// Tool name (cache namespace), e.g. `uv`.
    pub name: String,
    /// Concrete version installed.
    pub version: String,
    /// Architecture the install was made for.
    pub arch: Arch,
    /// Absolute install directory containing the executables.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_strategy_parses_inputs() {
        assert_eq!(
            "".parse::<ResolutionStrategy>(),
            Ok(ResolutionStrategy::Highest)
        );
        assert_eq!(
            "lowest".parse::<ResolutionStrategy>(),
            Ok(ResolutionStrategy::Lowest)
        );
        let err = "invalid".parse::<ResolutionStrategy>().unwrap_err();
        assert_eq!(
            err,
            "Invalid resolution-strategy: invalid. Must be 'highest' or 'lowest'."
        );
    }

    #[test]
    fn archive_format_from_names() {
        assert_eq!(
            ArchiveFormat::from_filename("uv-x86_64-unknown-linux-gnu.tar.gz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_filename("uv-x86_64-pc-windows-msvc.ZIP"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(ArchiveFormat::from_filename("uv.sha256"), None);
    }

    #[test]
    fn descriptor_file_name_ignores_query() {
        let d = ArtifactDescriptor {
            version: "0.9.26".into(),
            arch: Arch::X86_64,
            platform: Platform::LinuxGnu,
            url: "https://example.com/dl/uv-x86_64-unknown-linux-gnu.tar.gz?sig=1".into(),
            format: ArchiveFormat::TarGz,
            checksum: None,
        };
        assert_eq!(d.file_name(), "uv-x86_64-unknown-linux-gnu.tar.gz");
    }
}
