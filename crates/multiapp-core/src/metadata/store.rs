//! Persistence boundary for installed plugins.
//!
//! Owns two artifacts under the launcher root:
//! - `installed.json`: the whole [`InstalledState`] document
//! - `plugins/<name>/version.txt`: one version marker per plugin

use crate::config::LauncherPaths;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json, atomic_write_text};
use crate::models::{InstalledState, OrphanReport, Version};
use crate::{LauncherError, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Reads and writes plugin state on disk.
///
/// All read-modify-write cycles on `installed.json` go through
/// [`LocalPluginStore::update_installed_state`], which holds one lock for the
/// whole cycle. Plain reads and whole-document writes do not coordinate with
/// each other: the last writer wins.
pub struct LocalPluginStore {
    paths: LauncherPaths,
    /// Serializes read-modify-write cycles on the state document.
    state_lock: Mutex<()>,
}

impl LocalPluginStore {
    pub fn new(paths: LauncherPaths) -> Self {
        Self {
            paths,
            state_lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    pub fn plugin_dir(&self, name: &str) -> PathBuf {
        self.paths.plugin_dir(name)
    }

    // ========================================
    // Installed state
    // ========================================

    /// Load the state document, reporting corruption as an error.
    pub fn try_read_installed_state(&self) -> Result<InstalledState> {
        let path = self.paths.installed_state_file();
        match atomic_read_json::<InstalledState>(&path) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Ok(InstalledState::default()),
            Err(e) => Err(LauncherError::StateCorruption {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Load the state document.
    ///
    /// A missing file is an empty state. So is an unreadable one: the document
    /// only holds enabled flags and is rebuilt as plugins are reinstalled, so
    /// corruption is logged and otherwise ignored.
    pub fn read_installed_state(&self) -> InstalledState {
        match self.try_read_installed_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("{}; continuing with an empty installed state", e);
                InstalledState::default()
            }
        }
    }

    /// Replace the whole state document.
    pub fn write_installed_state(&self, state: &InstalledState) -> Result<()> {
        let path = self.paths.installed_state_file();
        debug!("Saving installed state to {}", path.display());
        atomic_write_json(&path, state)
    }

    /// Read-modify-write the state document under the store lock.
    ///
    /// The document is only written when `f` returns `Ok`.
    pub fn update_installed_state<T>(
        &self,
        f: impl FnOnce(&mut InstalledState) -> Result<T>,
    ) -> Result<T> {
        let _guard = self
            .state_lock
            .lock()
            .map_err(|_| LauncherError::Other("Installed state lock poisoned".to_string()))?;

        let mut state = self.read_installed_state();
        let value = f(&mut state)?;
        self.write_installed_state(&state)?;
        Ok(value)
    }

    /// Enabled flag; false for plugins without a record.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.read_installed_state().is_enabled(name)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.read_installed_state().is_installed(name)
    }

    // ========================================
    // Version markers
    // ========================================

    /// Local version of a plugin; `0.0.0` when the marker is missing or unreadable.
    pub fn read_version(&self, name: &str) -> Version {
        let path = self.paths.version_marker(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Version::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Version::ZERO,
            Err(e) => {
                debug!("Failed to read version marker {}: {}", path.display(), e);
                Version::ZERO
            }
        }
    }

    pub fn write_version(&self, name: &str, version: &Version) -> Result<()> {
        atomic_write_text(&self.paths.version_marker(name), &version.to_string())
    }

    // ========================================
    // Plugin directories
    // ========================================

    /// Names of plugin directories present on disk, whatever the state document says.
    pub fn list_installed_dirs(&self) -> BTreeSet<String> {
        let plugins_dir = self.paths.plugins_dir();
        let entries = match std::fs::read_dir(&plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", plugins_dir.display(), e);
                }
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect()
    }

    pub fn has_plugin_dir(&self, name: &str) -> bool {
        self.plugin_dir(name).is_dir()
    }

    /// Compare the state document with the plugins directory.
    pub fn find_orphans(&self) -> OrphanReport {
        let state = self.read_installed_state();
        let dirs = self.list_installed_dirs();

        OrphanReport {
            untracked_dirs: dirs
                .iter()
                .filter(|name| !state.is_installed(name))
                .cloned()
                .collect(),
            dangling_records: state
                .names()
                .filter(|name| !dirs.contains(*name))
                .map(String::from)
                .collect(),
        }
    }
}
