//! Closed host enumerations used to build download URLs and cache keys.

use serde::{Deserialize, Serialize};

/// CPU architecture of a release build.
///
/// The string form is the Rust target-triple prefix that upstream release
/// assets are named with (`uv-<arch>-<platform>.tar.gz`).
///
/// # Example
///
/// ```
/// use setup_uv_schema::Arch;
///
/// let arch: Arch = "aarch64".parse().unwrap();
/// assert_eq!(arch.as_str(), "aarch64");
/// assert_eq!(Arch::from_host_id("arm64"), Some(Arch::Aarch64));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit x86.
    #[serde(rename = "i686")]
    I686,
    /// 64-bit x86.
    #[serde(rename = "x86_64")]
    X86_64,
    /// 64-bit ARM.
    #[serde(rename = "aarch64")]
    Aarch64,
    /// IBM Z.
    #[serde(rename = "s390x")]
    S390x,
    /// Little-endian 64-bit POWER.
    #[serde(rename = "powerpc64le")]
    Powerpc64le,
}

impl Arch {
    /// Every supported architecture, in no particular order.
    pub const ALL: [Self; 5] = [
        Self::I686,
        Self::X86_64,
        Self::Aarch64,
        Self::S390x,
        Self::Powerpc64le,
    ];

    /// Canonical (asset file name) representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::S390x => "s390x",
            Self::Powerpc64le => "powerpc64le",
        }
    }

    /// Map a raw host CPU identifier to a supported architecture.
    ///
    /// Accepts both Rust's `std::env::consts::ARCH` values and the short
    /// names CI runners report (`x64`, `arm64`, `ia32`, `ppc64`).
    /// Returns `None` for hosts no release is built for.
    pub fn from_host_id(id: &str) -> Option<Self> {
        match id {
            "x86" | "ia32" | "i686" => Some(Self::I686),
            "x86_64" | "x64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "s390x" => Some(Self::S390x),
            "powerpc64" | "ppc64" | "powerpc64le" => Some(Self::Powerpc64le),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unsupported architecture: {s}"))
    }
}

/// Operating system / ABI part of a release target triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Linux with glibc.
    #[serde(rename = "unknown-linux-gnu")]
    LinuxGnu,
    /// Linux with musl libc.
    #[serde(rename = "unknown-linux-musl")]
    LinuxMusl,
    /// Linux with musl libc, hard-float ARM ABI.
    #[serde(rename = "unknown-linux-musleabihf")]
    LinuxMusleabihf,
    /// macOS.
    #[serde(rename = "apple-darwin")]
    MacOs,
    /// Windows with the MSVC toolchain.
    #[serde(rename = "pc-windows-msvc")]
    WindowsMsvc,
}

impl Platform {
    /// Every supported platform, in no particular order.
    pub const ALL: [Self; 5] = [
        Self::LinuxGnu,
        Self::LinuxMusl,
        Self::LinuxMusleabihf,
        Self::MacOs,
        Self::WindowsMsvc,
    ];

    /// Canonical (asset file name) representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinuxGnu => "unknown-linux-gnu",
            Self::LinuxMusl => "unknown-linux-musl",
            Self::LinuxMusleabihf => "unknown-linux-musleabihf",
            Self::MacOs => "apple-darwin",
            Self::WindowsMsvc => "pc-windows-msvc",
        }
    }

    /// Map a raw host OS identifier to a platform, assuming glibc on Linux.
    ///
    /// Accepts `std::env::consts::OS` values as well as `darwin` / `win32`.
    pub fn from_host_os(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(Self::LinuxGnu),
            "macos" | "darwin" => Some(Self::MacOs),
            "windows" | "win32" => Some(Self::WindowsMsvc),
            _ => None,
        }
    }

    /// Whether this is one of the Linux triples.
    pub fn is_linux(&self) -> bool {
        matches!(
            self,
            Self::LinuxGnu | Self::LinuxMusl | Self::LinuxMusleabihf
        )
    }

    /// Whether this is the Windows triple.
    pub fn is_windows(&self) -> bool {
        matches!(self, Self::WindowsMsvc)
    }

    /// Archive format upstream publishes for this platform.
    pub fn archive_format(&self) -> crate::ArchiveFormat {
        if self.is_windows() {
            crate::ArchiveFormat::Zip
        } else {
            crate::ArchiveFormat::TarGz
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unsupported platform: {s}"))
    }
}

/// Split a full target triple (`aarch64-apple-darwin`) into its parts.
///
/// Returns `None` when either half is outside the supported enumerations,
/// e.g. `armv7-unknown-linux-gnueabihf`.
pub fn split_target(target: &str) -> Option<(Arch, Platform)> {
    Arch::ALL.into_iter().find_map(|arch| {
        let rest = target.strip_prefix(arch.as_str())?.strip_prefix('-')?;
        rest.parse::<Platform>().ok().map(|platform| (arch, platform))
    })
}
