//! Regenerate the bundled checksum table

use anyhow::{Context, Result};
use setup_uv_core::checksum::update::update_known_checksums as update;
use setup_uv_core::sources::GitHubSource;

use crate::inputs::{UpdateChecksumsArgs, non_empty};
use crate::ops::Outputs;

pub async fn update_known_checksums(args: &UpdateChecksumsArgs) -> Result<()> {
    let source = GitHubSource::with_api_base(non_empty(args.github_token.as_deref()), &args.github_api_url)?;
    let latest = update(&source, &args.output)
        .await
        .with_context(|| format!("Failed to update {}", args.output.display()))?;

    match latest {
        Some(tag) => {
            println!("{tag}");
            Outputs::from_env().set_output("latest-version", &tag)?;
        }
        None => tracing::warn!("No releases found"),
    }
    Ok(())
}
