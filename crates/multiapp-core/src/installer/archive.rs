//! Plugin package extraction.
//!
//! Packages are zip archives; gzip-compressed tarballs are accepted too. The
//! format is sniffed from the first bytes rather than trusted from the URL.

use crate::{LauncherError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    fn sniff(header: &[u8]) -> Option<Self> {
        match header {
            [b'P', b'K', 3, 4, ..] | [b'P', b'K', 5, 6, ..] => Some(ArchiveFormat::Zip),
            [0x1f, 0x8b, ..] => Some(ArchiveFormat::TarGz),
            _ => None,
        }
    }
}

/// Unpack `archive_path` into `dest_dir`, whose contents become the plugin directory.
///
/// Entries whose paths would land outside `dest_dir` are skipped.
pub(crate) fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let mut header = [0u8; 4];
    let read = File::open(archive_path)
        .and_then(|mut file| file.read(&mut header))
        .map_err(|e| LauncherError::io_with_path(e, archive_path))?;

    let format = ArchiveFormat::sniff(&header[..read]).ok_or_else(|| LauncherError::Validation {
        field: "archive".to_string(),
        message: "not a zip or tar.gz archive".to_string(),
    })?;

    std::fs::create_dir_all(dest_dir).map_err(|e| LauncherError::io_with_path(e, dest_dir))?;

    info!("Extracting {:?} archive to {}", format, dest_dir.display());
    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tarball(archive_path, dest_dir),
    }
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io_with_path(e, archive_path))?;

    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| {
        LauncherError::Validation {
            field: "archive".to_string(),
            message: format!("Invalid zip archive: {}", e),
        }
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| LauncherError::Validation {
            field: "archive".to_string(),
            message: format!("Failed to read zip entry {}: {}", i, e),
        })?;

        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                debug!("Skipping unsafe zip entry {}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| LauncherError::io_with_path(e, &outpath))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
        }

        let mut outfile =
            File::create(&outpath).map_err(|e| LauncherError::io_with_path(e, &outpath))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| LauncherError::io_with_path(e, &outpath))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(())
}

fn extract_tarball(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io_with_path(e, archive_path))?;

    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    // `unpack` refuses entries that escape the destination.
    archive.unpack(dest_dir).map_err(|e| LauncherError::Validation {
        field: "archive".to_string(),
        message: format!("Failed to extract tarball: {}", e),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ArchiveFormat::sniff(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::sniff(&[0x1f, 0x8b, 8, 0]), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::sniff(b"<htm"), None);
        assert_eq!(ArchiveFormat::sniff(b""), None);
    }

    #[test]
    fn test_extract_zip_keeps_archive_root() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("chronos.zip");
        write_zip(&archive, &[("app.txt", "entry"), ("assets/icon.txt", "icon")]);

        let dest = temp_dir.path().join("staging");
        extract(&archive, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("app.txt")).unwrap(), "entry");
        assert_eq!(std::fs::read_to_string(dest.join("assets/icon.txt")).unwrap(), "icon");
    }

    #[test]
    fn test_extract_skips_escaping_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evil.zip");
        write_zip(&archive, &[("../escaped.txt", "nope"), ("ok.txt", "fine")]);

        let dest = temp_dir.path().join("staging");
        extract(&archive, &dest).unwrap();

        assert!(dest.join("ok.txt").exists());
        assert!(!temp_dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_extract_tarball() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("chronos.tar.gz");
        {
            let encoder = flate2::write::GzEncoder::new(
                File::create(&archive).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(encoder);
            let data = b"entry";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "app.txt", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = temp_dir.path().join("staging");
        extract(&archive, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("app.txt")).unwrap(), "entry");
    }

    #[test]
    fn test_rejects_non_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("page.html");
        std::fs::write(&archive, "<html>404</html>").unwrap();

        let result = extract(&archive, &temp_dir.path().join("staging"));
        assert!(matches!(result, Err(LauncherError::Validation { .. })));
        assert!(!temp_dir.path().join("staging").exists());
    }
}
