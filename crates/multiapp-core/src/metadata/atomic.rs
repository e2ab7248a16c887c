//! Atomic file writes for launcher state.
//!
//! Every write goes to a temp file in the target's directory, is synced, and
//! is then renamed over the target. Readers see either the old or the new
//! document, never a torn one.

use crate::{LauncherError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if reading or parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LauncherError::Io {
                message: format!("Failed to read {}", path.display()),
                path: Some(path.to_path_buf()),
                source: Some(e),
            })
        }
    };

    let data: T = serde_json::from_str(&contents).map_err(|e| LauncherError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Serialize `data` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data).map_err(|e| LauncherError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    atomic_write_bytes(path, serialized.as_bytes())
}

/// Write a text file atomically.
pub fn atomic_write_text(path: &Path, contents: &str) -> Result<()> {
    atomic_write_bytes(path, contents.as_bytes())
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
        message: format!("Failed to create directory {}", parent.display()),
        path: Some(parent.to_path_buf()),
        source: Some(e),
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| LauncherError::Io {
        message: format!("Failed to create temp file in {}", parent.display()),
        path: Some(parent.to_path_buf()),
        source: Some(e),
    })?;

    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| LauncherError::Io {
            message: format!("Failed to write temp file for {}", path.display()),
            path: Some(temp.path().to_path_buf()),
            source: Some(e),
        })?;

    temp.persist(path).map_err(|e| LauncherError::Io {
        message: format!("Failed to replace {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}
