//! Archive integrity checks.
//!
//! The expected digest is taken from exactly one source, in priority order:
//! the user, the bundled [`known`] table, then whatever the version data
//! source published. With no expected digest the check is skipped.

pub mod known;
pub mod update;

use std::io::Read;
use std::path::Path;

use setup_uv_schema::{Arch, Platform};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("Checksum for {path} did not match {expected}.")]
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where an expected digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOrigin {
    User,
    KnownTable,
    DataSource,
}

impl std::fmt::Display for ChecksumOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user input",
            Self::KnownTable => "known checksums",
            Self::DataSource => "version manifest",
        })
    }
}

/// Pick the expected digest by priority. Blank user input counts as absent.
///
/// Values are returned as given; nothing here decides a digest is malformed.
pub fn select_expected(
    user: Option<&str>,
    arch: Arch,
    platform: Platform,
    version: &str,
    fallback: Option<&str>,
) -> Option<(String, ChecksumOrigin)> {
    if let Some(user) = user.map(str::trim).filter(|s| !s.is_empty()) {
        return Some((user.to_string(), ChecksumOrigin::User));
    }
    let key = known::checksum_key(arch, platform, version);
    if let Some(known) = known::lookup(&key) {
        return Some((known.to_string(), ChecksumOrigin::KnownTable));
    }
    fallback.map(|d| (d.to_string(), ChecksumOrigin::DataSource))
}

/// Validate `path` against the highest-priority expected digest.
///
/// The computed lowercase hex digest must equal the expected value exactly.
///
/// # Errors
///
/// Returns [`ChecksumError::Mismatch`] naming the file and the expected
/// value when the digests differ, or an I/O error if the file can't be read.
pub async fn validate_checksum(
    user: Option<&str>,
    path: &Path,
    arch: Arch,
    platform: Platform,
    version: &str,
    fallback: Option<&str>,
) -> Result<(), ChecksumError> {
    let Some((expected, origin)) = select_expected(user, arch, platform, version, fallback) else {
        debug!("No checksum found for {arch}-{platform}-{version}; skipping validation");
        return Ok(());
    };

    debug!("Validating {} against checksum from {origin}", path.display());
    let actual = sha256_file(path).await?;
    if actual != expected {
        return Err(ChecksumError::Mismatch {
            path: path.display().to_string(),
            expected,
            actual,
        });
    }

    debug!("Checksum for {} is valid", path.display());
    Ok(())
}

/// Stream a file through SHA-256 on a blocking thread.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        let mut file = std::fs::File::open(&path)?;
        let mut buffer = [0u8; 8192];
        loop {
            let count = file.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }
        Ok::<String, std::io::Error>(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(std::io::Error::other)?
}
