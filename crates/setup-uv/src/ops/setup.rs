//! One setup run: resolve, install, export, restore.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use setup_uv_core::acquire::{AcquireRequest, Acquirer};
use setup_uv_core::cache::DirectoryCacheStore;
use setup_uv_core::io::download::Downloader;
use setup_uv_core::platform;
use setup_uv_core::sources::{GitHubSource, ManifestCache, ManifestSource};
use setup_uv_core::tool_cache::ToolCache;
use setup_uv_core::version::{discover::discover_version, resolve_version};
use setup_uv_core::{SourceChain, VersionSource, default_tool_bin_dir};
use setup_uv_schema::{Arch, DEFAULT_MANIFEST_URL, Platform, TOOL_NAME};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::inputs::{SetupArgs, non_empty};
use crate::ops::cache;
use crate::ops::{Outputs, SetupError};

/// What a setup run produced.
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub version: String,
    pub arch: Arch,
    pub platform: Platform,
    pub install_dir: PathBuf,
    pub cache_key: Option<String>,
    pub cache_hit: bool,
}

/// Run setup against the runner's tool cache.
pub async fn setup(args: &SetupArgs, outputs: &Outputs) -> Result<SetupReport, SetupError> {
    let cwd = std::env::current_dir()?;
    setup_with(args, &cwd, &ToolCache::from_env(), outputs).await
}

pub async fn setup_with(
    args: &SetupArgs,
    cwd: &Path,
    tool_cache: &ToolCache,
    outputs: &Outputs,
) -> Result<SetupReport, SetupError> {
    let working_dir = args.working_dir(cwd);
    if !args.ignore_empty_workdir {
        warn_if_empty(&working_dir);
    }

    let (arch, platform) = platform::detect(
        non_empty(args.arch.as_deref()),
        non_empty(args.platform.as_deref()),
    )
    .await?;

    let token = non_empty(args.github_token.as_deref());
    let sources = version_sources(args, token)?;

    let spec = discover_version(
        args.uv_version.as_deref(),
        args.version_file(&working_dir).as_deref(),
        &working_dir,
    );
    let version = resolve_version(&spec, &sources, args.resolution_strategy).await?;
    info!("Resolved uv version: {version}");

    let lookup = tool_cache.try_get_cached(TOOL_NAME, arch, &version, args.resolution_strategy);
    let install_dir = if let Some(path) = lookup.path {
        info!("Found uv in tool-cache for {}", lookup.version);
        path
    } else {
        let downloader = Downloader::new(reqwest::Client::new());
        let mut acquirer = Acquirer::new(&sources, downloader, tool_cache.clone()).with_token(token);
        let installed = acquirer
            .acquire(AcquireRequest {
                version: &version,
                arch,
                platform,
                checksum: non_empty(args.checksum.as_deref()),
            })
            .await?;
        installed.path
    };

    export_install(args, platform, &version, &install_dir, outputs)?;
    if args.activate_environment {
        activate_environment(&install_dir, &working_dir, platform, outputs).await?;
    }

    let mut report = SetupReport {
        version,
        arch,
        platform,
        install_dir,
        cache_key: None,
        cache_hit: false,
    };

    if args.cache.enable_cache.enabled() {
        let key = cache::compute_cache_key(args, arch, platform, &report.version, &working_dir).await?;
        let store = DirectoryCacheStore::new(args.cache.cache_store_dir());
        report.cache_hit = cache::restore(args, &key, &store, outputs).await?;
        report.cache_key = Some(key.to_string());
    } else {
        debug!("Caching is disabled");
    }

    info!("Successfully installed uv version {}", report.version);
    Ok(report)
}

/// Manifest first, then the release listing.
fn version_sources(args: &SetupArgs, token: Option<&str>) -> Result<SourceChain, SetupError> {
    let location = non_empty(args.manifest_file.as_deref()).unwrap_or(DEFAULT_MANIFEST_URL);
    let manifest = ManifestSource::new(reqwest::Client::new(), location, Arc::new(ManifestCache::new()));
    let github = GitHubSource::with_api_base(token, &args.github_api_url)?;
    let sources: Vec<Box<dyn VersionSource>> = vec![Box::new(manifest), Box::new(github)];
    Ok(SourceChain::new(sources))
}

fn export_install(
    args: &SetupArgs,
    platform: Platform,
    version: &str,
    install_dir: &Path,
    outputs: &Outputs,
) -> Result<(), SetupError> {
    if let Some(dir) = args.tool_bin_dir(platform) {
        outputs.export_variable("UV_TOOL_BIN_DIR", &dir.to_string_lossy())?;
        outputs.add_path(&dir)?;
    } else if let Some(dir) = default_tool_bin_dir() {
        outputs.add_path(&dir)?;
    }
    if let Some(dir) = args.tool_dir(platform) {
        outputs.export_variable("UV_TOOL_DIR", &dir.to_string_lossy())?;
    }

    outputs.add_path(install_dir)?;
    outputs.set_output("uv-path", &executable(install_dir, "uv", platform).to_string_lossy())?;
    outputs.set_output("uvx-path", &executable(install_dir, "uvx", platform).to_string_lossy())?;
    outputs.set_output("uv-version", version)?;

    if let Some(python) = non_empty(args.python_version.as_deref()) {
        outputs.export_variable("UV_PYTHON", python)?;
    }
    outputs.export_variable("UV_CACHE_DIR", &args.cache.cache_local_path().to_string_lossy())?;
    if args.cache.cache_python {
        outputs.export_variable("UV_PYTHON_INSTALL_DIR", &args.cache.python_dir().to_string_lossy())?;
    }
    Ok(())
}

fn executable(dir: &Path, name: &str, platform: Platform) -> PathBuf {
    let ext = if platform.is_windows() { ".exe" } else { "" };
    dir.join(format!("{name}{ext}"))
}

/// `uv venv .venv` in the working directory, then export it as the active
/// environment.
async fn activate_environment(
    install_dir: &Path,
    working_dir: &Path,
    platform: Platform,
    outputs: &Outputs,
) -> Result<(), SetupError> {
    info!("Activating python venv...");
    let status = Command::new(executable(install_dir, "uv", platform))
        .arg("venv")
        .arg(".venv")
        .arg("--directory")
        .arg(working_dir)
        .status()
        .await?;
    if !status.success() {
        return Err(SetupError::context("uv venv", status));
    }

    let venv = working_dir.join(".venv");
    let bin = if platform.is_windows() { "Scripts" } else { "bin" };
    outputs.add_path(&venv.join(bin))?;
    outputs.export_variable("VIRTUAL_ENV", &venv.to_string_lossy())?;
    Ok(())
}

fn warn_if_empty(dir: &Path) {
    let empty = match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    };
    if empty {
        warn!(
            "Empty workdir detected. This may cause unexpected behavior. You can enable ignore-empty-workdir to mute this warning."
        );
    }
}
