//! Restore and save steps for uv's own cache.

use std::path::Path;

use setup_uv_core::cache::{CacheError, CacheStore, SaveOutcome, restore_cache, save_cache};
use setup_uv_core::cache_key::{CacheKey, dependency_hash};
use setup_uv_core::platform::os_name_version;
use setup_uv_schema::{Arch, Platform};
use tokio::process::Command;
use tracing::{info, warn};

use crate::inputs::{CacheArgs, SaveCacheArgs, SetupArgs, non_empty};
use crate::ops::{Outputs, SetupError};

pub const STATE_CACHE_KEY: &str = "cache-key";
pub const STATE_CACHE_MATCHED_KEY: &str = "cache-matched-key";

pub async fn compute_cache_key(
    args: &SetupArgs,
    arch: Arch,
    platform: Platform,
    version: &str,
    working_dir: &Path,
) -> Result<CacheKey, SetupError> {
    Ok(CacheKey {
        arch,
        platform,
        os_name_version: os_name_version().await,
        version: version.to_string(),
        pruned: args.cache.prune_cache,
        cache_python: args.cache.cache_python,
        dependency_hash: dependency_hash(&args.cache_dependency_glob, working_dir).await?,
        suffix: non_empty(args.cache_suffix.as_deref()).map(str::to_string),
    })
}

/// Record `key` and restore the cache; `true` on an exact hit.
pub async fn restore(
    args: &SetupArgs,
    key: &CacheKey,
    store: &dyn CacheStore,
    outputs: &Outputs,
) -> Result<bool, SetupError> {
    let key = key.to_string();
    outputs.save_state(STATE_CACHE_KEY, &key)?;
    outputs.set_output("cache-key", &key)?;

    if !args.restore_cache {
        info!("restore-cache is false. Skipping restore cache step.");
        outputs.set_output("cache-hit", "false")?;
        return Ok(false);
    }

    let matched = restore_cache(store, &key, &args.cache.cache_paths()).await;
    if let Some(matched) = &matched {
        outputs.save_state(STATE_CACHE_MATCHED_KEY, matched)?;
    }
    let hit = matched.as_deref() == Some(key.as_str());
    outputs.set_output("cache-hit", if hit { "true" } else { "false" })?;
    Ok(hit)
}

/// Post-job save using the key recorded by [`restore`].
pub async fn save(
    args: &SaveCacheArgs,
    key: Option<&str>,
    matched_key: Option<&str>,
    store: &dyn CacheStore,
) -> Result<Option<SaveOutcome>, SetupError> {
    let fresh = key.is_some_and(|k| !k.is_empty() && matched_key != Some(k));
    let mut paths = args.cache.cache_paths();

    if fresh {
        if args.cache.prune_cache {
            prune(&args.cache).await?;
        }

        let cache_dir = args.cache.cache_local_path();
        if !cache_dir.exists() {
            if args.ignore_nothing_to_cache {
                info!("Cache path {} does not exist on disk. Not saving cache.", cache_dir.display());
                return Ok(None);
            }
            return Err(SetupError::NothingToCache(cache_dir));
        }
        paths.retain(|p| {
            let keep = p.exists();
            if !keep {
                warn!("Python cache path {} does not exist on disk, skipping", p.display());
            }
            keep
        });
    }

    match save_cache(store, key, matched_key, &paths).await {
        Ok(outcome) => Ok(Some(outcome)),
        Err(CacheError::KeyExists(k)) => {
            warn!("{}", CacheError::KeyExists(k));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// `uv cache prune --ci` against the cache directory.
async fn prune(cache: &CacheArgs) -> Result<(), SetupError> {
    let uv = match which::which("uv") {
        Ok(path) => path,
        Err(e) => {
            warn!("uv not found on PATH, skipping cache prune: {e}");
            return Ok(());
        }
    };
    info!("Pruning cache...");
    let status = Command::new(&uv)
        .args(["cache", "prune", "--ci"])
        .env("UV_CACHE_DIR", cache.cache_local_path())
        .status()
        .await?;
    if !status.success() {
        return Err(SetupError::context("uv cache prune --ci", status));
    }
    Ok(())
}
