//! Dependency cache store.
//!
//! The store is keyed by an opaque fingerprint (see [`crate::cache_key`]) and
//! holds a set of directories. Entries are only ever added.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to reserve cache with key {0}, another job may be creating this cache.")]
    KeyExists(String),

    #[error("Cache entry {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Save/restore blob store keyed by fingerprint.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Restore `paths` from the entry for `key`; the key that matched, if any.
    async fn restore(&self, paths: &[PathBuf], key: &str) -> Result<Option<String>, CacheError>;

    /// Store `paths` under `key`. Existing entries are never replaced.
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), CacheError>;
}

/// One `.tar.gz` per key in a local directory.
///
/// Each saved path is archived under its index (`0/`, `1/`, ...) so a restore
/// maps entries back onto the path list it is given.
#[derive(Debug, Clone)]
pub struct DirectoryCacheStore {
    root: PathBuf,
}

impl DirectoryCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.tar.gz"))
    }
}

#[async_trait]
impl CacheStore for DirectoryCacheStore {
    async fn restore(&self, paths: &[PathBuf], key: &str) -> Result<Option<String>, CacheError> {
        let entry = self.entry_path(key);
        if !entry.is_file() {
            debug!("No cache entry at {}", entry.display());
            return Ok(None);
        }
        let paths = paths.to_vec();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            unpack_entry(&entry, &paths, &key)?;
            Ok(Some(key))
        })
        .await
        .map_err(std::io::Error::other)?
    }

    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), CacheError> {
        let entry = self.entry_path(key);
        if entry.exists() {
            return Err(CacheError::KeyExists(key.to_string()));
        }
        let root = self.root.clone();
        let paths = paths.to_vec();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&root)?;
            let staging = tempfile::NamedTempFile::new_in(&root)?;
            pack_entry(staging.as_file(), &paths)?;
            staging.persist_noclobber(&entry).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    CacheError::KeyExists(key)
                } else {
                    CacheError::Io(e.error)
                }
            })?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

fn pack_entry(file: &File, paths: &[PathBuf]) -> Result<(), CacheError> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (i, path) in paths.iter().enumerate() {
        if !path.exists() {
            warn!("Cache path {} does not exist, skipping", path.display());
            continue;
        }
        if path.is_dir() {
            builder.append_dir_all(i.to_string(), path)?;
        } else {
            builder.append_path_with_name(path, i.to_string())?;
        }
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

fn unpack_entry(entry: &Path, paths: &[PathBuf], key: &str) -> Result<(), CacheError> {
    let corrupt = |reason: String| CacheError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(File::open(entry)?)));
    for item in archive.entries()? {
        let mut item = item?;
        let name = item.path()?.into_owned();
        let mut components = name.components();
        let index = match components.next() {
            Some(Component::Normal(first)) => first
                .to_str()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| corrupt(format!("unexpected entry {}", name.display())))?,
            _ => return Err(corrupt(format!("unexpected entry {}", name.display()))),
        };
        let Some(target_root) = paths.get(index) else {
            debug!("Ignoring entry for path #{index}");
            continue;
        };

        let rest: PathBuf = components.collect();
        if rest.as_os_str().is_empty() {
            if item.header().entry_type().is_dir() {
                fs::create_dir_all(target_root)?;
            } else {
                if let Some(parent) = target_root.parent() {
                    fs::create_dir_all(parent)?;
                }
                item.unpack(target_root)?;
            }
            continue;
        }

        fs::create_dir_all(target_root)?;
        let dest = target_root.join(&rest);
        if !dest.starts_with(target_root) || rest.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(corrupt(format!("path escapes cache root: {}", name.display())));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        item.unpack(&dest)?;
    }
    Ok(())
}

/// Outcome of [`save_cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The restore step already matched this exact key.
    ExactHit,
    /// No key was recorded by the restore step.
    MissingKey,
}

/// Restore `paths` for `key`. Store failures are logged and treated as a miss.
pub async fn restore_cache(store: &dyn CacheStore, key: &str, paths: &[PathBuf]) -> Option<String> {
    info!("Trying to restore uv cache with key: {key}");
    match store.restore(paths, key).await {
        Ok(Some(matched)) => {
            info!("uv cache restored with key: {matched}");
            Some(matched)
        }
        Ok(None) => {
            info!("No cache found for key: {key}");
            None
        }
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

/// Save `paths` unless the restore step already hit this exact key.
pub async fn save_cache(
    store: &dyn CacheStore,
    key: Option<&str>,
    matched_key: Option<&str>,
    paths: &[PathBuf],
) -> Result<SaveOutcome, CacheError> {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        warn!("Error retrieving cache key from state.");
        return Ok(SaveOutcome::MissingKey);
    };
    if matched_key == Some(key) {
        info!("Cache hit occurred on key {key}, not saving cache.");
        return Ok(SaveOutcome::ExactHit);
    }

    for path in paths {
        info!("Saving cache path: {}", path.display());
    }
    store.save(paths, key).await?;
    info!("cache saved with the key: {key}");
    Ok(SaveOutcome::Saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("wheels")).unwrap();
        fs::write(dir.join("wheels").join("a.whl"), b"wheel").unwrap();
        fs::write(dir.join("CACHEDIR.TAG"), b"tag").unwrap();
    }

    #[tokio::test]
    async fn save_then_restore_round_trips_directories() {
        let store_dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        let cache_dir = work.path().join("uv-cache");
        let python_dir = work.path().join("python");
        populate(&cache_dir);
        fs::create_dir_all(&python_dir).unwrap();
        fs::write(python_dir.join("python3"), b"py").unwrap();

        let store = DirectoryCacheStore::new(store_dir.path());
        let paths = vec![cache_dir.clone(), python_dir.clone()];
        let outcome = save_cache(&store, Some("k1"), None, &paths).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        fs::remove_dir_all(&cache_dir).unwrap();
        fs::remove_dir_all(&python_dir).unwrap();

        assert_eq!(restore_cache(&store, "k1", &paths).await.as_deref(), Some("k1"));
        assert_eq!(fs::read(cache_dir.join("wheels").join("a.whl")).unwrap(), b"wheel");
        assert_eq!(fs::read(python_dir.join("python3")).unwrap(), b"py");
    }

    #[tokio::test]
    async fn miss_and_existing_keys() {
        let store_dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        populate(work.path());
        let store = DirectoryCacheStore::new(store_dir.path());
        let paths = vec![work.path().to_path_buf()];

        assert_eq!(restore_cache(&store, "absent", &paths).await, None);

        store.save(&paths, "k").await.unwrap();
        let err = store.save(&paths, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::KeyExists(_)));
    }

    #[tokio::test]
    async fn exact_hit_and_missing_key_skip_saving() {
        let store_dir = tempdir().unwrap();
        let store = DirectoryCacheStore::new(store_dir.path());
        let paths = vec![store_dir.path().join("nothing")];

        assert_eq!(
            save_cache(&store, Some("k"), Some("k"), &paths).await.unwrap(),
            SaveOutcome::ExactHit
        );
        assert_eq!(
            save_cache(&store, None, None, &paths).await.unwrap(),
            SaveOutcome::MissingKey
        );
        assert!(!store.entry_path("k").exists());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_warning_not_a_failure() {
        let store_dir = tempdir().unwrap();
        let store = DirectoryCacheStore::new(store_dir.path());
        fs::write(store.entry_path("bad"), b"not gzip").unwrap();
        let target = store_dir.path().join("restore-here");
        assert_eq!(restore_cache(&store, "bad", &[target]).await, None);
    }

    #[test]
    fn keys_are_sanitised_into_file_names() {
        let store = DirectoryCacheStore::new("/cache");
        assert_eq!(
            store.entry_path("setup-uv-2-x86_64/a b"),
            PathBuf::from("/cache/setup-uv-2-x86_64_a_b.tar.gz")
        );
    }
}
