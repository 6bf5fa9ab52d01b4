//! Post-job cache save

use anyhow::Result;
use setup_uv_core::cache::DirectoryCacheStore;
use tracing::info;

use crate::inputs::SaveCacheArgs;
use crate::ops::Outputs;
use crate::ops::cache::{self, STATE_CACHE_KEY, STATE_CACHE_MATCHED_KEY};

pub async fn save_cache(args: &SaveCacheArgs) -> Result<()> {
    if !args.cache.enable_cache.enabled() {
        info!("Cache is disabled, not saving cache.");
        return Ok(());
    }
    let key = Outputs::get_state(STATE_CACHE_KEY);
    let matched = Outputs::get_state(STATE_CACHE_MATCHED_KEY);
    let store = DirectoryCacheStore::new(args.cache.cache_store_dir());
    cache::save(args, key.as_deref(), matched.as_deref(), &store).await?;
    Ok(())
}
