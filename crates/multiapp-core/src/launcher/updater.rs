//! Comparison of the local launcher version with the remote manifest.

use crate::config::{AppConfig, LauncherPaths};
use crate::metadata::atomic_write_text;
use crate::models::Version;
use crate::network::RemoteCatalogClient;
use crate::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Result of checking for launcher updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherUpdateCheck {
    /// Whether the manifest announces a newer version.
    pub has_update: bool,
    /// Version from `app_version.txt`.
    pub local_version: Version,
    /// Version announced by the manifest.
    pub remote_version: Version,
}

/// Reads the launcher's own version and checks it against a manifest.
pub struct LauncherUpdater {
    version_file: PathBuf,
    client: RemoteCatalogClient,
}

impl LauncherUpdater {
    pub fn new(paths: &LauncherPaths, client: RemoteCatalogClient) -> Self {
        Self {
            version_file: paths.app_version_file(),
            client,
        }
    }

    /// Local launcher version.
    ///
    /// A missing or blank version file reads as the default version.
    pub fn local_version(&self) -> Version {
        match std::fs::read_to_string(&self.version_file) {
            Ok(contents) if !contents.trim().is_empty() => Version::parse(&contents),
            Ok(_) => Version::parse(AppConfig::DEFAULT_LOCAL_VERSION),
            Err(e) => {
                debug!(
                    "No launcher version at {}: {}",
                    self.version_file.display(),
                    e
                );
                Version::parse(AppConfig::DEFAULT_LOCAL_VERSION)
            }
        }
    }

    /// Record the launcher version, e.g. after the user installed a release.
    pub fn set_local_version(&self, version: &Version) -> Result<()> {
        atomic_write_text(&self.version_file, &version.to_string())
    }

    /// Fetch the manifest at `manifest_url` and compare.
    pub async fn check_for_updates(&self, manifest_url: &str) -> Result<LauncherUpdateCheck> {
        let manifest = self.client.fetch_manifest(manifest_url).await?;
        let local_version = self.local_version();
        let check = LauncherUpdateCheck {
            has_update: local_version < manifest.version,
            local_version,
            remote_version: manifest.version,
        };

        if check.has_update {
            info!(
                "Launcher update available: {} -> {}",
                check.local_version, check.remote_version
            );
        } else {
            debug!("Launcher is up to date at {}", check.local_version);
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn updater(temp_dir: &TempDir) -> LauncherUpdater {
        let paths = LauncherPaths::new(temp_dir.path());
        LauncherUpdater::new(&paths, RemoteCatalogClient::new().unwrap())
    }

    fn manifest_url(temp_dir: &TempDir, version: &str) -> String {
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, format!(r#"{{"version": "{}"}}"#, version)).unwrap();
        url::Url::from_file_path(&path).unwrap().to_string()
    }

    #[test]
    fn test_local_version_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let updater = updater(&temp_dir);
        assert_eq!(updater.local_version(), Version::new(1, 0, 0));

        std::fs::write(temp_dir.path().join("app_version.txt"), "  \n").unwrap();
        assert_eq!(updater.local_version(), Version::new(1, 0, 0));

        updater.set_local_version(&Version::new(1, 4, 2)).unwrap();
        assert_eq!(updater.local_version(), Version::new(1, 4, 2));
    }

    #[tokio::test]
    async fn test_check_for_updates() {
        let temp_dir = TempDir::new().unwrap();
        let updater = updater(&temp_dir);

        let check = updater
            .check_for_updates(&manifest_url(&temp_dir, "1.2.0"))
            .await
            .unwrap();
        assert!(check.has_update);
        assert_eq!(check.remote_version, Version::new(1, 2, 0));

        let check = updater
            .check_for_updates(&manifest_url(&temp_dir, "1.0"))
            .await
            .unwrap();
        assert!(!check.has_update);
    }
}
