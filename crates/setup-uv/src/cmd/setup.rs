//! Setup command

use anyhow::Result;

use crate::inputs::SetupArgs;
use crate::ops::Outputs;

/// Install uv and export it to later steps.
pub async fn setup(args: &SetupArgs) -> Result<()> {
    let report = crate::ops::setup::setup(args, &Outputs::from_env()).await?;
    if let Some(key) = &report.cache_key {
        tracing::debug!("Cache key: {key} (hit: {})", report.cache_hit);
    }
    Ok(())
}
