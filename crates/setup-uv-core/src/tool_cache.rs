//! On-disk tool cache.
//!
//! Layout: `<root>/<tool>/<version>/<arch>/` holds an install and the
//! `.complete` file inside it marks it usable. Installs are staged next to
//! their final location with the marker already written, then renamed into
//! place, so the destination either does not exist or is complete. Nothing
//! here deletes a completed entry.

use std::fs;
use std::path::{Path, PathBuf};

use setup_uv_schema::{Arch, InstalledTool, ResolutionStrategy};
use thiserror::Error;
use tracing::debug;

use crate::version::Resolver;

/// File inside an install directory marking it complete.
pub const COMPLETE_MARKER: &str = ".complete";

#[derive(Error, Debug)]
pub enum ToolCacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source directory does not exist: {0}")]
    MissingSource(PathBuf),
}

/// Result of a cache lookup: the version that was looked up and, on a hit,
/// where it is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub version: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache rooted at [`crate::tool_cache_root`].
    pub fn from_env() -> Self {
        Self::new(crate::tool_cache_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn install_dir(&self, tool: &str, version: &str, arch: Arch) -> PathBuf {
        self.root.join(tool).join(version).join(arch.as_str())
    }

    fn is_complete(dir: &Path) -> bool {
        dir.join(COMPLETE_MARKER).is_file()
    }

    /// Completed versions of `tool` for `arch`, newest first.
    pub fn find_all_versions(&self, tool: &str, arch: Arch) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.root.join(tool)) else {
            return Vec::new();
        };

        let mut versions: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|v| Self::is_complete(&self.install_dir(tool, v, arch)))
            .collect();

        versions.sort_by(|a, b| {
            match (semver::Version::parse(a), semver::Version::parse(b)) {
                (Ok(x), Ok(y)) => y.cmp(&x),
                _ => b.cmp(a),
            }
        });
        versions
    }

    /// Install directory of an exact version, if complete.
    pub fn find(&self, tool: &str, version: &str, arch: Arch) -> Option<PathBuf> {
        let dir = self.install_dir(tool, version, arch);
        Self::is_complete(&dir).then_some(dir)
    }

    /// Look in the cache for anything satisfying `spec`.
    ///
    /// On a miss the returned version is `spec` unchanged. Read-only.
    pub fn try_get_cached(
        &self,
        tool: &str,
        arch: Arch,
        spec: &str,
        strategy: ResolutionStrategy,
    ) -> CacheLookup {
        debug!("Trying to get {tool} from tool cache for {spec}...");
        let cached = self.find_all_versions(tool, arch);
        debug!("Cached versions: {cached:?}");

        let version = Resolver::default()
            .select(spec, &cached, strategy)
            .unwrap_or_else(|| spec.to_string());
        let path = self.find(tool, &version, arch);
        CacheLookup { version, path }
    }

    /// Copy `source` into the cache as `(tool, version, arch)`.
    ///
    /// A complete existing entry is returned untouched, including one that
    /// a concurrent run moved into place first. A leftover incomplete entry
    /// is replaced.
    pub fn cache_dir(
        &self,
        source: &Path,
        tool: &str,
        version: &str,
        arch: Arch,
    ) -> Result<InstalledTool, ToolCacheError> {
        if !source.is_dir() {
            return Err(ToolCacheError::MissingSource(source.to_path_buf()));
        }

        let record = |path: PathBuf| InstalledTool {
            name: tool.to_string(),
            version: version.to_string(),
            arch,
            path,
        };

        if let Some(existing) = self.find(tool, version, arch) {
            debug!("{tool} {version} already cached at {}", existing.display());
            return Ok(record(existing));
        }

        let version_dir = self.root.join(tool).join(version);
        fs::create_dir_all(&version_dir)?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", arch.as_str()))
            .tempdir_in(&version_dir)?;
        copy_dir_all(source, staging.path())?;
        fs::write(staging.path().join(COMPLETE_MARKER), b"")?;

        let dest = self.install_dir(tool, version, arch);
        if dest.exists() && !Self::is_complete(&dest) {
            debug!("Replacing incomplete cache entry at {}", dest.display());
            match fs::remove_dir_all(&dest) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        if let Err(e) = fs::rename(staging.path(), &dest) {
            if let Some(existing) = self.find(tool, version, arch) {
                debug!("{tool} {version} was cached concurrently at {}", existing.display());
                return Ok(record(existing));
            }
            return Err(e.into());
        }

        debug!("Cached {tool} {version} ({arch}) at {}", dest.display());
        Ok(record(dest))
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_install(dir: &Path) {
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("uv"), b"#!/bin/sh\n").unwrap();
        fs::write(dir.join("nested").join("uvx"), b"#!/bin/sh\n").unwrap();
    }

    #[test]
    fn cached_entry_round_trips_through_lookup() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        fake_install(src.path());

        let cache = ToolCache::new(root.path());
        let installed = cache
            .cache_dir(src.path(), "uv", "0.9.26", Arch::X86_64)
            .unwrap();
        assert!(installed.path.join("nested").join("uvx").is_file());

        let exact = cache.try_get_cached("uv", Arch::X86_64, "0.9.26", ResolutionStrategy::Highest);
        assert_eq!(exact.path.as_deref(), Some(installed.path.as_path()));

        let range = cache.try_get_cached("uv", Arch::X86_64, ">=0.9.0", ResolutionStrategy::Highest);
        assert_eq!(range.version, "0.9.26");
        assert!(range.path.is_some());

        let other_arch = cache.try_get_cached("uv", Arch::Aarch64, "0.9.26", ResolutionStrategy::Highest);
        assert!(other_arch.path.is_none());
    }

    #[test]
    fn miss_returns_spec_unchanged() {
        let root = tempdir().unwrap();
        let cache = ToolCache::new(root.path());
        let miss = cache.try_get_cached("uv", Arch::X86_64, "^0.4", ResolutionStrategy::Lowest);
        assert_eq!(miss.version, "^0.4");
        assert!(miss.path.is_none());
    }

    #[test]
    fn entries_without_marker_are_invisible() {
        let root = tempdir().unwrap();
        let partial = root.path().join("uv").join("0.9.25").join("x86_64");
        fake_install(&partial);

        let cache = ToolCache::new(root.path());
        assert!(cache.find_all_versions("uv", Arch::X86_64).is_empty());
        assert!(cache.find("uv", "0.9.25", Arch::X86_64).is_none());

        // A real install replaces the leftover.
        let src = tempdir().unwrap();
        fake_install(src.path());
        cache.cache_dir(src.path(), "uv", "0.9.25", Arch::X86_64).unwrap();
        assert_eq!(cache.find_all_versions("uv", Arch::X86_64), vec!["0.9.25"]);
    }

    #[test]
    fn marker_lives_inside_the_install() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        fake_install(src.path());

        let cache = ToolCache::new(root.path());
        let installed = cache.cache_dir(src.path(), "uv", "0.9.26", Arch::X86_64).unwrap();
        assert!(installed.path.join(COMPLETE_MARKER).is_file());

        // Nothing but the install itself is left in the version directory.
        let names: Vec<_> = fs::read_dir(root.path().join("uv").join("0.9.26"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("x86_64")]);
    }

    #[test]
    fn concurrent_installs_of_one_version_all_succeed() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        fake_install(src.path());
        let cache = ToolCache::new(root.path());

        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| cache.cache_dir(src.path(), "uv", "0.9.26", Arch::X86_64)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap().path)
                .collect()
        });

        let expected = root.path().join("uv").join("0.9.26").join("x86_64");
        assert!(paths.iter().all(|p| *p == expected));
        assert!(expected.join("uv").is_file());
        assert_eq!(cache.find_all_versions("uv", Arch::X86_64), vec!["0.9.26"]);
    }

    #[test]
    fn versions_sort_newest_first() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        fake_install(src.path());
        let cache = ToolCache::new(root.path());
        for v in ["0.9.5", "0.10.0", "0.9.26"] {
            cache.cache_dir(src.path(), "uv", v, Arch::Aarch64).unwrap();
        }
        assert_eq!(
            cache.find_all_versions("uv", Arch::Aarch64),
            vec!["0.10.0", "0.9.26", "0.9.5"]
        );
        let lowest = cache.try_get_cached("uv", Arch::Aarch64, "0.9.x", ResolutionStrategy::Lowest);
        assert_eq!(lowest.version, "0.9.5");
    }
}
