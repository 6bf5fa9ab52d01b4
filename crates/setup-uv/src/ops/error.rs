//! Errors surfaced by a setup run

use std::path::PathBuf;

use setup_uv_core::acquire::AcquireError;
use setup_uv_core::cache::CacheError;
use setup_uv_core::cache_key::CacheKeyError;
use setup_uv_core::platform::PlatformError;
use setup_uv_core::sources::SourceError;
use setup_uv_core::version::ResolveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Failed to query versions: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("Failed to compute the cache key: {0}")]
    CacheKey(#[from] CacheKeyError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Cache path {} does not exist on disk. This likely indicates that there are no dependencies to cache. Consider disabling the cache input if it is not needed.",
        .0.display()
    )]
    NothingToCache(PathBuf),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl SetupError {
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}
