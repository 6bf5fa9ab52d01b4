//! Host identification: canonical (architecture, platform triple) pair.
//!
//! On Linux the C library flavour is read from `ldd --version`, since
//! glibc and musl builds are published separately.

use std::path::Path;

use setup_uv_schema::{Arch, Platform};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("libc detection failed: {0}")]
    Libc(String),
}

/// Map the running host's CPU to a supported architecture.
pub fn identify_arch() -> Option<Arch> {
    Arch::from_host_id(std::env::consts::ARCH)
}

/// Map the running host's OS to a supported platform, probing libc on Linux.
pub async fn identify_platform() -> Option<Platform> {
    let base = Platform::from_host_os(std::env::consts::OS)?;
    if base.is_linux() {
        Some(detect_linux_libc().await)
    } else {
        Some(base)
    }
}

/// Resolve the host pair, honouring explicit overrides.
///
/// Overrides use the canonical names (`x86_64`, `unknown-linux-musl`).
pub async fn detect(
    arch_override: Option<&str>,
    platform_override: Option<&str>,
) -> Result<(Arch, Platform), PlatformError> {
    let arch = match arch_override {
        Some(raw) => raw
            .parse::<Arch>()
            .map_err(|_| PlatformError::UnsupportedArch(raw.to_string()))?,
        None => identify_arch()
            .ok_or_else(|| PlatformError::UnsupportedArch(std::env::consts::ARCH.to_string()))?,
    };

    let platform = match platform_override {
        Some(raw) => raw
            .parse::<Platform>()
            .map_err(|_| PlatformError::UnsupportedPlatform(raw.to_string()))?,
        None => identify_platform()
            .await
            .ok_or_else(|| PlatformError::UnsupportedPlatform(std::env::consts::OS.to_string()))?,
    };

    debug!("Host identified as {arch}-{platform}");
    Ok((arch, platform))
}

/// Classify glibc vs musl from `ldd --version` output.
///
/// musl's `ldd` prints its banner to stderr and exits non-zero, so callers
/// pass both streams concatenated.
pub fn classify_libc(ldd_output: &str) -> Platform {
    if ldd_output.to_ascii_lowercase().contains("musl") {
        Platform::LinuxMusl
    } else {
        Platform::LinuxGnu
    }
}

/// Best-effort libc detection; falls back to glibc with a warning.
pub async fn detect_linux_libc() -> Platform {
    let output = match which::which("ldd") {
        Ok(ldd) => run_ldd(&ldd).await,
        Err(e) => Err(PlatformError::Libc(e.to_string())),
    };
    libc_from_ldd(output)
}

/// Platform for the outcome of running `ldd`. A failure means glibc.
pub fn libc_from_ldd(output: Result<String, PlatformError>) -> Platform {
    match output {
        Ok(output) => classify_libc(&output),
        Err(e) => {
            warn!("Could not determine C library flavour, assuming glibc: {e}");
            Platform::LinuxGnu
        }
    }
}

/// Run `<ldd> --version` and return stdout and stderr together.
pub async fn run_ldd(ldd: &Path) -> Result<String, PlatformError> {
    let output = Command::new(ldd)
        .arg("--version")
        .output()
        .await
        .map_err(|e| PlatformError::Libc(format!("{}: {e}", ldd.display())))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if text.trim().is_empty() {
        return Err(PlatformError::Libc("ldd produced no output".to_string()));
    }
    Ok(text)
}

/// `<os name>-<os version>` fragment used in cache keys (e.g. `ubuntu-24.04`).
pub async fn os_name_version() -> String {
    match std::env::consts::OS {
        "linux" => match tokio::fs::read_to_string("/etc/os-release").await {
            Ok(text) => parse_os_release(&text).unwrap_or_else(|| "linux".to_string()),
            Err(e) => {
                debug!("Could not read /etc/os-release: {e}");
                "linux".to_string()
            }
        },
        "macos" => match Command::new("sw_vers").arg("-productVersion").output().await {
            Ok(out) if out.status.success() => {
                format!("macos-{}", String::from_utf8_lossy(&out.stdout).trim())
            }
            _ => "macos".to_string(),
        },
        other => other.to_string(),
    }
}

/// Extract `ID-VERSION_ID` from `/etc/os-release` contents.
pub fn parse_os_release(text: &str) -> Option<String> {
    let field = |key: &str| {
        text.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|v| v.trim().trim_matches('"').to_string())
        })
    };
    let id = field("ID")?;
    match field("VERSION_ID") {
        Some(version) => Some(format!("{id}-{version}")),
        None => Some(id),
    }
}
