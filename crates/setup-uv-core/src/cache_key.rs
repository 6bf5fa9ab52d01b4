//! Fingerprint for the dependency cache.
//!
//! `setup-uv-<schema>-<arch>-<platform>-<os>-<version>[-pruned][-py]-<deps>[-<suffix>]`
//! where `<deps>` is a hash of the dependency files or `no-dependency-glob`.
//! Bumping [`CACHE_VERSION`] invalidates every key produced before it.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use setup_uv_schema::{Arch, Platform};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::paths::resolve_path;

pub const CACHE_KEY_PREFIX: &str = "setup-uv";
pub const CACHE_VERSION: &str = "2";
pub const NO_DEPENDENCY_GLOB: &str = "no-dependency-glob";

#[derive(Error, Debug)]
pub enum CacheKeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Everything the fingerprint is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub arch: Arch,
    pub platform: Platform,
    pub os_name_version: String,
    pub version: String,
    pub pruned: bool,
    pub cache_python: bool,
    /// Hash of the dependency files; `None` renders the sentinel.
    pub dependency_hash: Option<String>,
    pub suffix: Option<String>,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{CACHE_KEY_PREFIX}-{CACHE_VERSION}-{}-{}-{}-{}",
            self.arch, self.platform, self.os_name_version, self.version
        )?;
        if self.pruned {
            f.write_str("-pruned")?;
        }
        if self.cache_python {
            f.write_str("-py")?;
        }
        match &self.dependency_hash {
            Some(hash) => write!(f, "-{hash}")?,
            None => write!(f, "-{NO_DEPENDENCY_GLOB}")?,
        }
        if let Some(suffix) = self.suffix.as_deref().filter(|s| !s.is_empty()) {
            write!(f, "-{suffix}")?;
        }
        Ok(())
    }
}

/// Hash for the `cache-dependency-glob` input, one pattern per line.
///
/// Returns `None` (with a warning) when nothing matched, and also when no
/// patterns were given at all.
pub async fn dependency_hash(
    patterns: &str,
    working_dir: &Path,
) -> Result<Option<String>, CacheKeyError> {
    let lines: Vec<&str> = patterns
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Ok(None);
    }

    info!("Searching files using cache dependency glob: {}", lines.join(","));
    let hash = hash_files(patterns, working_dir).await?;
    if hash.is_none() {
        warn!(
            "No file matched to [{}]. The cache will never get invalidated. Make sure you have checked out the target repository and configured the cache-dependency-glob input correctly.",
            lines.join(",")
        );
    }
    Ok(hash)
}

/// SHA-256 over the SHA-256 of every file matched by `patterns`.
///
/// Lines starting with `!` exclude matches. Relative patterns are anchored
/// at `working_dir`; directories are skipped.
pub async fn hash_files(patterns: &str, working_dir: &Path) -> Result<Option<String>, CacheKeyError> {
    let patterns = patterns.to_string();
    let working_dir = working_dir.to_path_buf();
    tokio::task::spawn_blocking(move || hash_files_blocking(&patterns, &working_dir))
        .await
        .map_err(std::io::Error::other)?
}

fn hash_files_blocking(patterns: &str, working_dir: &Path) -> Result<Option<String>, CacheKeyError> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for line in patterns.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.strip_prefix('!') {
            Some(negated) => excludes.push(glob::Pattern::new(&anchor(negated, working_dir))?),
            None => includes.push(anchor(line, working_dir)),
        }
    }

    let mut files: BTreeSet<PathBuf> = BTreeSet::new();
    for pattern in &includes {
        for path in glob::glob(pattern)?.filter_map(Result::ok) {
            if path.is_dir() {
                debug!("Skip directory '{}'.", path.display());
                continue;
            }
            if excludes.iter().any(|ex| ex.matches_path(&path)) {
                continue;
            }
            files.insert(path);
        }
    }

    if files.is_empty() {
        debug!("No matches found for glob");
        return Ok(None);
    }

    let mut outer = Sha256::new();
    for file in &files {
        info!("{}", file.display());
        outer.update(file_digest(file)?);
    }
    info!("Found {} files to hash.", files.len());
    Ok(Some(hex::encode(outer.finalize())))
}

fn anchor(pattern: &str, working_dir: &Path) -> String {
    resolve_path(pattern, working_dir).to_string_lossy().into_owned()
}

fn file_digest(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 8192];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(hasher.finalize().to_vec())
}
