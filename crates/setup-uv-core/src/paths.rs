use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Root of the on-disk tool cache.
///
/// `$RUNNER_TOOL_CACHE` on hosted runners, otherwise
/// `<data dir>/setup-uv/toolcache`.
pub fn tool_cache_root() -> PathBuf {
    if let Some(val) = non_empty_env("RUNNER_TOOL_CACHE") {
        return PathBuf::from(val);
    }
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("setup-uv")
        .join("toolcache")
}

/// Scratch directory for downloads: `$RUNNER_TEMP` or the OS temp dir.
pub fn runner_temp() -> PathBuf {
    non_empty_env("RUNNER_TEMP").map_or_else(std::env::temp_dir, PathBuf::from)
}

/// Default location of the tool's own working-state cache.
pub fn default_cache_local_path() -> PathBuf {
    runner_temp().join("setup-uv-cache")
}

/// Where uv puts tool executables when `UV_TOOL_BIN_DIR` is unset.
pub fn default_tool_bin_dir() -> Option<PathBuf> {
    default_tool_bin_dir_from(non_empty_env, home_dir())
}

/// `$XDG_BIN_HOME`, else `$XDG_DATA_HOME/../bin`, else `<home>/.local/bin`.
pub fn default_tool_bin_dir_from(
    env: impl Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(bin) = env("XDG_BIN_HOME") {
        return Some(PathBuf::from(bin));
    }
    if let Some(data) = env("XDG_DATA_HOME") {
        return Some(PathBuf::from(data).join("..").join("bin"));
    }
    home.map(|h| h.join(".local").join("bin"))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Resolve a user-supplied path: expand `~`, then anchor relative paths at `base`.
pub fn resolve_path(path: &str, base: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(path.strip_prefix("./").unwrap_or(path))
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .split('/')
        .next_back()
        .unwrap_or("")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
