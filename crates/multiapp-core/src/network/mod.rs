//! Network access for the launcher.
//!
//! This module provides:
//! - [`RemoteCatalogClient`] for the catalog and manifest documents
//! - [`Downloader`] for plugin archives, with progress and retries
//!
//! Both accept `http(s)://` and `file://` URLs.

mod client;
mod download;

pub use client::RemoteCatalogClient;
pub use download::{DownloadOutcome, DownloadProgress, Downloader};

use crate::{LauncherError, Result};
use std::path::PathBuf;

/// Where a URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Source {
    Http(url::Url),
    File(PathBuf),
}

impl Source {
    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let fetch_error = |message: String| LauncherError::RemoteFetch {
            url: raw.to_string(),
            message,
        };

        let url = url::Url::parse(raw).map_err(|e| fetch_error(format!("invalid URL: {}", e)))?;
        match url.scheme() {
            "http" | "https" => Ok(Source::Http(url)),
            "file" => url
                .to_file_path()
                .map(Source::File)
                .map_err(|_| fetch_error("file URL has no usable path".to_string())),
            other => Err(fetch_error(format!("unsupported scheme '{}'", other))),
        }
    }
}
