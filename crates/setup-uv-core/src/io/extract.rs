//! Archive extraction
//!
//! Handles tar.gz and zip release archives.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use setup_uv_schema::ArchiveFormat;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Extract a tar.gz archive; returns the files written, relative to `dest_dir`.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    extract_tar(gz_decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative: PathBuf = entry.path()?.components().collect();

        // `unpack_in` refuses paths escaping dest_dir.
        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative.display()
            )));
        }
        if !entry.header().entry_type().is_dir() {
            extracted.push(relative);
        }
    }

    Ok(extracted)
}

/// Extract a zip archive; returns the files written, relative to `dest_dir`.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative) = file.enclosed_name() else {
            continue;
        };

        let absolute = dest_dir.join(&relative);
        if file.is_dir() {
            fs::create_dir_all(&absolute)?;
            continue;
        }
        if let Some(p) = absolute.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute, fs::Permissions::from_mode(mode))?;
        }

        extracted.push(relative);
    }

    Ok(extracted)
}

/// Extract by declared format.
///
/// Zip-named archives go through the tar reader first, since some release
/// hosts serve tarballs under a zip name; real zips fall through to the
/// zip reader.
pub fn extract_archive(
    archive_path: &Path,
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveFormat::Zip => match extract_tar_gz(archive_path, dest_dir) {
            Ok(files) if !files.is_empty() => Ok(files),
            Ok(_) | Err(_) => {
                debug!(
                    "{} is not a tarball, extracting as zip",
                    archive_path.display()
                );
                if dest_dir.exists() {
                    fs::remove_dir_all(dest_dir)?;
                }
                extract_zip(archive_path, dest_dir)
            }
        },
    }
}

/// [`extract_archive`] on a blocking thread.
pub async fn extract(
    archive_path: &Path,
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    let archive = archive_path.to_path_buf();
    let dest = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive, format, &dest))
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn tar_gz_keeps_layout_and_modes() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("uv.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("uv-x86_64-unknown-linux-gnu/uv", b"uv", 0o755),
                ("uv-x86_64-unknown-linux-gnu/uvx", b"uvx", 0o755),
            ],
        );

        let dest = dir.path().join("out");
        let files = extract_archive(&archive, ArchiveFormat::TarGz, &dest).unwrap();
        assert_eq!(files.len(), 2);
        let uv = dest.join("uv-x86_64-unknown-linux-gnu").join("uv");
        assert_eq!(fs::read(&uv).unwrap(), b"uv");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_ne!(fs::metadata(&uv).unwrap().permissions().mode() & 0o111, 0);
        }
    }

    #[test]
    fn zip_falls_back_from_tar() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("uv.zip");
        write_zip(&archive, &[("uv.exe", b"MZ"), ("uvx.exe", b"MZ")]);

        let dest = dir.path().join("out");
        let files = extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();
        assert_eq!(files.len(), 2);
        assert!(dest.join("uv.exe").is_file());
    }

    #[test]
    fn tarball_named_zip_extracts_as_tar() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("uv.zip");
        write_tar_gz(&archive, &[("uv.exe", b"MZ", 0o644)]);

        let dest = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();
        assert!(dest.join("uv.exe").is_file());
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("uv.zip");
        fs::write(&archive, b"not an archive").unwrap();
        let err = extract_archive(&archive, ArchiveFormat::Zip, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Archive(_)));
    }
}
