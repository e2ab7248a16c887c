//! Client for the remote catalog and manifest documents.

use super::Source;
use crate::config::{AppConfig, NetworkConfig};
use crate::models::{Catalog, Manifest};
use crate::{LauncherError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches the plugin catalog and the launcher manifest.
///
/// Every failure (bad URL, connection, timeout, HTTP status, malformed JSON)
/// comes back as [`LauncherError::RemoteFetch`] naming the URL. Nothing here
/// touches local state.
#[derive(Debug, Clone)]
pub struct RemoteCatalogClient {
    client: Client,
}

impl RemoteCatalogClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| LauncherError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch `{"apps": [...]}` from `url`.
    pub async fn fetch_catalog(&self, url: &str) -> Result<Catalog> {
        let catalog: Catalog = self.fetch_json(url).await?;
        info!("Fetched catalog with {} entries from {}", catalog.apps.len(), url);
        Ok(catalog)
    }

    /// Fetch `{"version": "x.y.z"}` from `url`.
    pub async fn fetch_manifest(&self, url: &str) -> Result<Manifest> {
        let manifest: Manifest = self.fetch_json(url).await?;
        debug!("Fetched manifest version {} from {}", manifest.version, url);
        Ok(manifest)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let fetch_error = |message: String| LauncherError::RemoteFetch {
            url: url.to_string(),
            message,
        };

        let body = match Source::parse(url)? {
            Source::Http(parsed) => {
                let response = self
                    .client
                    .get(parsed)
                    .send()
                    .await
                    .map_err(|e| fetch_error(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(fetch_error(format!("HTTP {}", status)));
                }

                response
                    .bytes()
                    .await
                    .map_err(|e| fetch_error(e.to_string()))?
                    .to_vec()
            }
            Source::File(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| fetch_error(format!("{}: {}", path.display(), e)))?,
        };

        serde_json::from_slice(&body).map_err(|e| fetch_error(format!("malformed JSON: {}", e)))
    }
}
