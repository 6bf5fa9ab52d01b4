//! Step inputs.
//!
//! Flags mirror the action inputs and read `INPUT_<NAME>` when not given on
//! the command line.

use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, ValueEnum};
use setup_uv_core::{default_cache_local_path, expand_tilde, runner_temp};
use setup_uv_schema::{Platform, ResolutionStrategy};

pub const DEFAULT_DEPENDENCY_GLOB: &str = "**/uv.lock\n**/requirements*.txt";

/// `enable-cache` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EnableCache {
    /// Only on GitHub-hosted runners.
    #[default]
    Auto,
    True,
    False,
}

impl EnableCache {
    pub fn resolve(self, runner_environment: Option<&str>) -> bool {
        match self {
            Self::Auto => runner_environment == Some("github-hosted"),
            Self::True => true,
            Self::False => false,
        }
    }

    pub fn enabled(self) -> bool {
        self.resolve(std::env::var("RUNNER_ENVIRONMENT").ok().as_deref())
    }
}

/// Inputs shared by the restore and save steps.
#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    /// Enable uploading of the uv cache: true, false or auto
    #[arg(long, env = "INPUT_ENABLE_CACHE", value_enum, default_value_t)]
    pub enable_cache: EnableCache,

    /// Local path of the uv cache (defaults to $RUNNER_TEMP/setup-uv-cache)
    #[arg(long, env = "INPUT_CACHE_LOCAL_PATH")]
    pub cache_local_path: Option<String>,

    /// Also cache managed Python installations
    #[arg(long, env = "INPUT_CACHE_PYTHON", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = false)]
    pub cache_python: bool,

    /// Directory uv installs managed Pythons into
    #[arg(long, env = "UV_PYTHON_INSTALL_DIR")]
    pub python_dir: Option<String>,

    /// Prune the cache of pre-built wheels before saving
    #[arg(long, env = "INPUT_PRUNE_CACHE", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = true)]
    pub prune_cache: bool,

    /// Directory backing the cache store
    #[arg(long, env = "SETUP_UV_CACHE_STORE")]
    pub cache_store_dir: Option<PathBuf>,
}

impl CacheArgs {
    pub fn cache_local_path(&self) -> PathBuf {
        self.cache_local_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map_or_else(default_cache_local_path, expand_tilde)
    }

    pub fn python_dir(&self) -> PathBuf {
        self.python_dir
            .as_deref()
            .filter(|p| !p.is_empty())
            .map_or_else(|| runner_temp().join("uv-python-dir"), expand_tilde)
    }

    /// Every directory the cache entry covers.
    pub fn cache_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.cache_local_path()];
        if self.cache_python {
            paths.push(self.python_dir());
        }
        paths
    }

    pub fn cache_store_dir(&self) -> PathBuf {
        self.cache_store_dir
            .clone()
            .unwrap_or_else(|| runner_temp().join("setup-uv-cache-store"))
    }
}

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    /// Version specifier of uv to install (range, exact version or "latest")
    #[arg(long = "uv-version", env = "INPUT_VERSION")]
    pub uv_version: Option<String>,

    /// File to read the uv version from (.tool-versions, pyproject.toml, uv.toml, requirements.txt)
    #[arg(long, env = "INPUT_VERSION_FILE")]
    pub version_file: Option<String>,

    /// Which version to pick when a range matches several: highest or lowest
    #[arg(long, env = "INPUT_RESOLUTION_STRATEGY", default_value = "highest")]
    pub resolution_strategy: ResolutionStrategy,

    /// Expected SHA-256 of the downloaded archive
    #[arg(long, env = "INPUT_CHECKSUM")]
    pub checksum: Option<String>,

    /// URL or path of the version manifest
    #[arg(long, env = "INPUT_MANIFEST_FILE")]
    pub manifest_file: Option<String>,

    /// Token for the GitHub API and release downloads
    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, env = "GITHUB_API_URL", default_value = setup_uv_core::sources::github::DEFAULT_API_BASE)]
    pub github_api_url: String,

    /// Override the detected architecture (e.g. aarch64)
    #[arg(long, env = "INPUT_ARCHITECTURE")]
    pub arch: Option<String>,

    /// Override the detected platform (e.g. unknown-linux-musl)
    #[arg(long, env = "INPUT_PLATFORM")]
    pub platform: Option<String>,

    /// Python version exported as UV_PYTHON
    #[arg(long, env = "INPUT_PYTHON_VERSION")]
    pub python_version: Option<String>,

    /// Directory the project lives in
    #[arg(long, env = "INPUT_WORKING_DIRECTORY", default_value = ".")]
    pub working_directory: PathBuf,

    /// Glob patterns (one per line) of files whose contents key the cache
    #[arg(long, env = "INPUT_CACHE_DEPENDENCY_GLOB", default_value = DEFAULT_DEPENDENCY_GLOB)]
    pub cache_dependency_glob: String,

    /// Suffix appended to the cache key
    #[arg(long, env = "INPUT_CACHE_SUFFIX")]
    pub cache_suffix: Option<String>,

    /// Restore the cache during setup
    #[arg(long, env = "INPUT_RESTORE_CACHE", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = true)]
    pub restore_cache: bool,

    /// Don't warn about an empty working directory
    #[arg(long, env = "INPUT_IGNORE_EMPTY_WORKDIR", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = false)]
    pub ignore_empty_workdir: bool,

    /// Directory uv installs tool executables into (UV_TOOL_BIN_DIR)
    #[arg(long, env = "INPUT_TOOL_BIN_DIR")]
    pub tool_bin_dir: Option<String>,

    /// Directory uv stores tools in (UV_TOOL_DIR)
    #[arg(long, env = "INPUT_TOOL_DIR")]
    pub tool_dir: Option<String>,

    /// Create a virtual environment in the working directory and activate it
    #[arg(long, env = "INPUT_ACTIVATE_ENVIRONMENT", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = false)]
    pub activate_environment: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

impl SetupArgs {
    pub fn working_dir(&self, cwd: &Path) -> PathBuf {
        if self.working_directory.is_absolute() {
            self.working_directory.clone()
        } else {
            cwd.join(&self.working_directory)
        }
    }

    pub fn version_file(&self, working_dir: &Path) -> Option<PathBuf> {
        non_empty(self.version_file.as_deref())
            .map(|f| setup_uv_core::resolve_path(f, working_dir))
    }

    /// `tool-bin-dir`, defaulting to `$RUNNER_TEMP/uv-tool-bin-dir` on Windows.
    pub fn tool_bin_dir(&self, platform: Platform) -> Option<PathBuf> {
        tool_path(self.tool_bin_dir.as_deref(), platform, "uv-tool-bin-dir")
    }

    /// `tool-dir`, defaulting to `$RUNNER_TEMP/uv-tool-dir` on Windows.
    pub fn tool_dir(&self, platform: Platform) -> Option<PathBuf> {
        tool_path(self.tool_dir.as_deref(), platform, "uv-tool-dir")
    }
}

#[derive(Debug, Clone, Args)]
pub struct SaveCacheArgs {
    /// Don't fail when the cache directory does not exist
    #[arg(long, env = "INPUT_IGNORE_NOTHING_TO_CACHE", action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = false)]
    pub ignore_nothing_to_cache: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateChecksumsArgs {
    /// Rust source file to write the table to
    pub output: PathBuf,

    /// Token for the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, env = "GITHUB_API_URL", default_value = setup_uv_core::sources::github::DEFAULT_API_BASE)]
    pub github_api_url: String,
}

fn tool_path(input: Option<&str>, platform: Platform, windows_default: &str) -> Option<PathBuf> {
    match non_empty(input) {
        Some(dir) => Some(expand_tilde(dir)),
        None if platform.is_windows() => Some(runner_temp().join(windows_default)),
        None => None,
    }
}

/// Treat blank inputs as absent; unset action inputs arrive as "".
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
