//! Regenerate the bundled [`super::known`] table from release assets.

use std::fmt::Write as _;
use std::path::Path;

use setup_uv_schema::Sha256Digest;
use tracing::{debug, info, warn};

use super::known;
use crate::sources::SourceError;
use crate::sources::github::{CHECKSUM_SUFFIX, GitHubSource, parse_checksum_file};

/// Table key for a checksum asset: `uv-aarch64-apple-darwin.tar.gz.sha256`
/// in release `0.9.26` gives `aarch64-apple-darwin-0.9.26`.
///
/// Source tarballs have no platform and are skipped.
pub fn checksum_key_from_asset(asset_name: &str, version: &str) -> Option<String> {
    if asset_name.starts_with("source") {
        return None;
    }
    let stem = asset_name.split('.').next()?;
    let target = stem.split_once(&format!("{}-", setup_uv_schema::TOOL_NAME))?.1;
    (!target.is_empty()).then(|| format!("{target}-{version}"))
}

/// Render the table as a Rust source file.
pub fn render_table(entries: &[(String, String)]) -> String {
    let mut out = String::from(
        "// AUTOGENERATED by `setup-uv update-known-checksums`. Do not edit by hand.\n\n\
         use setup_uv_schema::{Arch, Platform};\n\n\
         /// Release checksums keyed by `<arch>-<platform>-<version>`.\n\
         pub static KNOWN_CHECKSUMS: &[(&str, &str)] = &[\n",
    );
    for (key, checksum) in entries {
        let _ = write!(out, "    (\n        \"{key}\",\n        \"{checksum}\",\n    ),\n");
    }
    out.push_str(
        "];\n\n\
         /// Composite lookup key for the table.\n\
         pub fn checksum_key(arch: Arch, platform: Platform, version: &str) -> String {\n    \
             format!(\"{arch}-{platform}-{version}\")\n\
         }\n\n\
         pub fn lookup(key: &str) -> Option<&'static str> {\n    \
             KNOWN_CHECKSUMS\n        \
                 .iter()\n        \
                 .find(|(k, _)| *k == key)\n        \
                 .map(|(_, v)| *v)\n\
         }\n",
    );
    out
}

/// Collect every `(key, checksum)` pair published by `source`, newest
/// release first. Known entries are reused instead of downloaded again;
/// a downloaded file that doesn't hold a valid digest is left out.
pub async fn collect_checksums(
    source: &GitHubSource,
) -> Result<Vec<(String, String)>, SourceError> {
    let mut entries = Vec::new();
    for release in source.list_releases().await? {
        for asset in release
            .assets
            .iter()
            .filter(|a| a.name.ends_with(CHECKSUM_SUFFIX))
        {
            let Some(key) = checksum_key_from_asset(&asset.name, &release.tag_name) else {
                continue;
            };
            let checksum = if let Some(existing) = known::lookup(&key) {
                existing.to_string()
            } else {
                debug!("Downloading {}", asset.download_url);
                let text = source.fetch_text(&asset.download_url).await?;
                match Sha256Digest::new(parse_checksum_file(&text).unwrap_or_default()) {
                    Ok(digest) => digest.as_str().to_string(),
                    Err(e) => {
                        warn!("Skipping {}: {e}", asset.name);
                        continue;
                    }
                }
            };
            entries.push((key, checksum));
        }
    }
    Ok(entries)
}

/// Newest release tag by SemVer ordering, falling back to listing order.
pub async fn latest_release_tag(source: &GitHubSource) -> Result<Option<String>, SourceError> {
    let releases = source.list_releases().await?;
    let newest = releases
        .iter()
        .filter_map(|r| semver::Version::parse(&r.tag_name).ok().map(|v| (v, &r.tag_name)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag.clone())
        .or_else(|| releases.first().map(|r| r.tag_name.clone()));
    Ok(newest)
}

/// Rewrite `output` with a fresh table and return the newest release tag.
pub async fn update_known_checksums(
    source: &GitHubSource,
    output: &Path,
) -> Result<Option<String>, SourceError> {
    let entries = collect_checksums(source).await?;
    tokio::fs::write(output, render_table(&entries)).await?;
    info!("Wrote {} checksums to {}", entries.len(), output.display());
    latest_release_tag(source).await
}
