//! Centralized configuration for the launcher.
//!
//! Compile-time constants for network and path handling live here alongside
//! the persisted [`LauncherConfig`] document (`config.toml`).

use crate::error::{LauncherError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "multiapp";
    pub const USER_AGENT: &'static str = concat!("multiapp/", env!("CARGO_PKG_VERSION"));
    /// Reported when `app_version.txt` is missing or empty.
    pub const DEFAULT_LOCAL_VERSION: &'static str = "1.0.0";
    pub const DEFAULT_MANIFEST_URL: &'static str =
        "https://exemple.github.io/multiapp/manifest.json";
    pub const DEFAULT_CATALOG_URL: &'static str = "https://exemple.github.io/multiapp/catalog.json";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_RETRY_ATTEMPTS: u32 = 3;
    pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
    /// Longest silence tolerated between two chunks of a download body.
    pub const DOWNLOAD_READ_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
}

/// Directory and file names under the launcher root.
pub struct PathsConfig;

impl PathsConfig {
    pub const PLUGINS_DIR_NAME: &'static str = "plugins";
    pub const TEMP_DIR_NAME: &'static str = ".tmp";
    pub const INSTALLED_STATE_FILENAME: &'static str = "installed.json";
    pub const CONFIG_FILENAME: &'static str = "config.toml";
    pub const APP_VERSION_FILENAME: &'static str = "app_version.txt";
    pub const VERSION_MARKER_FILENAME: &'static str = "version.txt";
}

/// Resolved on-disk layout of a launcher installation.
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    root: PathBuf,
}

impl LauncherPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::PLUGINS_DIR_NAME)
    }

    pub fn plugin_dir(&self, name: &str) -> PathBuf {
        self.plugins_dir().join(name)
    }

    pub fn version_marker(&self, name: &str) -> PathBuf {
        self.plugin_dir(name).join(PathsConfig::VERSION_MARKER_FILENAME)
    }

    /// Parent of all process-private download and staging directories.
    ///
    /// Kept under the root so staged plugins can be renamed into place.
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::TEMP_DIR_NAME)
    }

    pub fn installed_state_file(&self) -> PathBuf {
        self.root.join(PathsConfig::INSTALLED_STATE_FILENAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(PathsConfig::CONFIG_FILENAME)
    }

    pub fn app_version_file(&self) -> PathBuf {
        self.root.join(PathsConfig::APP_VERSION_FILENAME)
    }

    /// Create the directories the launcher writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.plugins_dir(), self.temp_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| LauncherError::Io {
                message: format!("Failed to create directory: {}", e),
                path: Some(dir.clone()),
                source: Some(e),
            })?;
        }
        Ok(())
    }
}

/// Persisted launcher configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// The `[remote]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            manifest_url: default_manifest_url(),
            catalog_url: default_catalog_url(),
        }
    }
}

fn default_manifest_url() -> String {
    AppConfig::DEFAULT_MANIFEST_URL.to_string()
}

fn default_catalog_url() -> String {
    AppConfig::DEFAULT_CATALOG_URL.to_string()
}

impl LauncherConfig {
    /// Keys accepted by [`LauncherConfig::set`].
    pub const KEYS: [&'static str; 2] = ["manifest_url", "catalog_url"];

    /// Load the config file, writing defaults first if it does not exist.
    ///
    /// Keys missing from an existing file take their default values.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LauncherError::io_with_path(e, path))?;
        let config: LauncherConfig =
            toml::from_str(&content).map_err(|e| LauncherError::Config {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config file, replacing any previous content.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| LauncherError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;
        crate::metadata::atomic_write_text(path, &content)
    }

    /// Look up a key of the `[remote]` section.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "manifest_url" => Some(&self.remote.manifest_url),
            "catalog_url" => Some(&self.remote.catalog_url),
            _ => None,
        }
    }

    /// Set a key of the `[remote]` section. The value must be a valid URL.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        url::Url::parse(value).map_err(|e| LauncherError::Validation {
            field: key.to_string(),
            message: format!("'{}' is not a valid URL: {}", value, e),
        })?;

        match key {
            "manifest_url" => self.remote.manifest_url = value.to_string(),
            "catalog_url" => self.remote.catalog_url = value.to_string(),
            _ => {
                return Err(LauncherError::Validation {
                    field: key.to_string(),
                    message: format!("unknown key, expected one of {:?}", Self::KEYS),
                })
            }
        }
        Ok(())
    }
}
