//! setup-uv - install uv on a CI runner
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Resolves a uv version, installs it into the runner's tool cache and
//! restores/saves uv's own cache between jobs.
//!
//! # Steps
//!
//! - `setup-uv` (default): resolve, install, export environment, restore cache.
//! - `setup-uv save-cache`: post-job step saving the uv cache.
//! - `setup-uv update-known-checksums`: regenerate the bundled checksum table.
//!
//! Every flag falls back to the matching `INPUT_*` environment variable, so
//! the binary can run directly as an action step.

pub mod cmd;
pub mod inputs;
pub mod ops;

pub use setup_uv_core::USER_AGENT;

use clap::{Parser, Subcommand};

use crate::inputs::{SaveCacheArgs, SetupArgs, UpdateChecksumsArgs};

#[derive(Debug, Parser)]
#[command(name = "setup-uv")]
#[command(author, version, about = "Install uv and manage its caches in CI")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub setup: SetupArgs,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve and install uv (the default)
    Setup(SetupArgs),
    /// Save the uv cache recorded by a previous setup step
    #[command(name = "save-cache")]
    SaveCache(SaveCacheArgs),
    /// Regenerate the known checksum table from release assets
    #[command(name = "update-known-checksums")]
    UpdateKnownChecksums(UpdateChecksumsArgs),
}
