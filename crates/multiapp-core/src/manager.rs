//! Plugin lifecycle manager.
//!
//! The single entry point a presentation layer talks to. It owns the local
//! store, the installer and the remote client, and derives every plugin's
//! state from disk on each call:
//!
//! - not installed: no record in `installed.json`
//! - installing / uninstalling: the plugin's lock is held
//! - installed (enabled or disabled): a record and a directory exist

use crate::cancel::CancellationToken;
use crate::config::{LauncherConfig, LauncherPaths};
use crate::host::{PluginHost, PluginRegistry};
use crate::installer::{PackageInstaller, ProgressReporter, ProgressUpdate, StepHook};
use crate::launcher::{LauncherUpdateCheck, LauncherUpdater};
use crate::metadata::LocalPluginStore;
use crate::models::{validate_plugin_name, Catalog, OrphanReport, PluginView, Version};
use crate::network::{Downloader, RemoteCatalogClient};
use crate::{LauncherError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Orchestrates install, update, enable, disable and uninstall of plugins.
///
/// Share one instance per process behind an `Arc`. Operations on different
/// plugins run concurrently; install, update and uninstall of the same plugin
/// are serialized by a per-name lock.
pub struct PluginLifecycleManager {
    paths: LauncherPaths,
    store: Arc<LocalPluginStore>,
    installer: PackageInstaller,
    client: RemoteCatalogClient,
    updater: LauncherUpdater,
    config: RwLock<LauncherConfig>,
    /// One async lock per plugin name, created on first use.
    plugin_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PluginLifecycleManager {
    /// Open the launcher rooted at `root`.
    ///
    /// Creates the directory layout and a default `config.toml` when missing,
    /// drops state records whose plugin directory is gone and clears install
    /// workspaces a crashed run left under `.tmp/`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let paths = LauncherPaths::new(root.as_ref());
        paths.ensure_dirs()?;

        let config = LauncherConfig::load_or_init(&paths.config_file())?;
        let store = Arc::new(LocalPluginStore::new(paths.clone()));
        let client = RemoteCatalogClient::new()?;
        let installer = PackageInstaller::new(store.clone())?;
        let updater = LauncherUpdater::new(&paths, client.clone());

        let manager = Self {
            paths,
            store,
            installer,
            client,
            updater,
            config: RwLock::new(config),
            plugin_locks: Mutex::new(HashMap::new()),
        };
        // Nothing else runs yet, so no per-name locks are needed here.
        manager.heal_dangling_records()?;
        manager.sweep_stale_workspaces();

        info!("Launcher opened at {}", manager.paths.root().display());
        Ok(manager)
    }

    /// Download packages with `downloader` (retry and timeout settings).
    pub fn with_downloader(self, downloader: Downloader) -> Self {
        Self {
            installer: self.installer.with_downloader(downloader),
            ..self
        }
    }

    /// Run `hook` before each uncommitted install step.
    pub fn with_step_hook(self, hook: Arc<dyn StepHook>) -> Self {
        Self {
            installer: self.installer.with_step_hook(hook),
            ..self
        }
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    pub fn store(&self) -> &LocalPluginStore {
        &self.store
    }

    // ========================================
    // Configuration
    // ========================================

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LauncherConfig {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Change one configuration key and save `config.toml`.
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let mut config = self
            .config
            .write()
            .map_err(|_| LauncherError::Other("Config lock poisoned".to_string()))?;

        let mut updated = config.clone();
        updated.set(key, value)?;
        updated.save(&self.paths.config_file())?;
        *config = updated;

        info!("Set {} = {}", key, value);
        Ok(())
    }

    // ========================================
    // Remote documents
    // ========================================

    /// Fetch the catalog from the configured URL.
    pub async fn fetch_catalog(&self) -> Result<Catalog> {
        let url = self.config().remote.catalog_url;
        self.client.fetch_catalog(&url).await
    }

    /// Compare the launcher's own version with the configured manifest.
    pub async fn check_launcher_update(&self) -> Result<LauncherUpdateCheck> {
        let url = self.config().remote.manifest_url;
        self.updater.check_for_updates(&url).await
    }

    // ========================================
    // Install / update / uninstall
    // ========================================

    /// Install `name` from its catalog entry.
    ///
    /// Installing a plugin that is already installed behaves as an update.
    pub async fn install(
        &self,
        name: &str,
        catalog: &Catalog,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.install_from_catalog(name, catalog, false, progress, cancel)
            .await
    }

    /// Update an installed plugin to its catalog version. The enabled flag is kept.
    pub async fn update(
        &self,
        name: &str,
        catalog: &Catalog,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.install_from_catalog(name, catalog, true, progress, cancel)
            .await
    }

    async fn install_from_catalog(
        &self,
        name: &str,
        catalog: &Catalog,
        require_installed: bool,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Err(e) = validate_plugin_name(name) {
            return Self::fail_before_install(name, e, progress).await;
        }
        let Some(entry) = catalog.get(name) else {
            let e = LauncherError::NotInCatalog {
                name: name.to_string(),
            };
            return Self::fail_before_install(name, e, progress).await;
        };

        let lock = self.plugin_lock(name);
        let _guard = lock.lock().await;

        if require_installed && !self.store.is_installed(name) {
            let e = LauncherError::NotInstalled {
                name: name.to_string(),
            };
            return Self::fail_before_install(name, e, progress).await;
        }

        self.installer
            .install_or_update(name, &entry.download_url, &entry.version, progress, cancel)
            .await
    }

    /// Report an error that stopped the operation before the installer ran.
    async fn fail_before_install(
        name: &str,
        error: LauncherError,
        progress: &ProgressReporter,
    ) -> Result<()> {
        warn!("Cannot install {}: {}", name, error);
        progress
            .send(ProgressUpdate::Completed {
                name: name.to_string(),
                success: false,
                message: Some(error.to_string()),
            })
            .await;
        Err(error)
    }

    /// Run [`install`](Self::install) on a background task.
    pub fn spawn_install(
        self: &Arc<Self>,
        name: impl Into<String>,
        catalog: Catalog,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        let manager = Arc::clone(self);
        let name = name.into();
        tokio::spawn(async move { manager.install(&name, &catalog, &progress, &cancel).await })
    }

    /// Remove a plugin. Succeeds when it is already gone.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        validate_plugin_name(name)?;
        let lock = self.plugin_lock(name);
        let _guard = lock.lock().await;
        self.installer.uninstall(name)
    }

    fn plugin_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.plugin_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(name.to_string()).or_default().clone()
    }

    // ========================================
    // Enabled flags
    // ========================================

    /// Set the enabled flag of an installed plugin.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.store.update_installed_state(|state| {
            let record = state
                .plugins
                .get_mut(name)
                .ok_or_else(|| LauncherError::NotInstalled {
                    name: name.to_string(),
                })?;
            record.enabled = enabled;
            Ok(())
        })?;

        info!("{} {}", if enabled { "Enabled" } else { "Disabled" }, name);
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&self, name: &str) -> Result<bool> {
        let enabled = self.store.update_installed_state(|state| {
            let record = state
                .plugins
                .get_mut(name)
                .ok_or_else(|| LauncherError::NotInstalled {
                    name: name.to_string(),
                })?;
            record.enabled = !record.enabled;
            Ok(record.enabled)
        })?;

        info!("Toggled {} to enabled={}", name, enabled);
        Ok(enabled)
    }

    // ========================================
    // Queries
    // ========================================

    /// Installed, enabled plugins whose directory exists, sorted by name.
    pub fn list_enabled_plugins(&self) -> Vec<String> {
        let state = self.store.read_installed_state();
        let on_disk = self.store.list_installed_dirs();

        state
            .names()
            .filter(|name| state.is_enabled(name) && on_disk.contains(*name))
            .map(String::from)
            .collect()
    }

    /// Whether `name` is installed and older than its catalog entry.
    pub fn needs_update(&self, name: &str, catalog: &Catalog) -> bool {
        if !self.store.is_installed(name) {
            return false;
        }
        catalog
            .get(name)
            .map(|entry| self.store.read_version(name) < entry.version)
            .unwrap_or(false)
    }

    /// One row per catalog entry, built from disk on every call.
    pub fn effective_catalog_view(&self, catalog: &Catalog) -> Vec<PluginView> {
        let state = self.store.read_installed_state();

        catalog
            .entries()
            .into_iter()
            .map(|entry| {
                let installed = state.is_installed(&entry.name);
                let local_version = if installed {
                    self.store.read_version(&entry.name)
                } else {
                    Version::ZERO
                };

                PluginView {
                    name: entry.name.clone(),
                    has_update: installed && local_version < entry.version,
                    enabled: installed && state.is_enabled(&entry.name),
                    local_version,
                    remote_version: entry.version,
                    installed,
                }
            })
            .collect()
    }

    /// Resolve render entry points for the currently enabled plugins.
    pub fn discover_plugins(&self, registry: &PluginRegistry) -> PluginHost {
        PluginHost::discover(registry, &self.store)
    }

    // ========================================
    // Orphans
    // ========================================

    /// Remove plugin directories without a record and records without a directory.
    pub async fn cleanup_orphans(&self) -> Result<OrphanReport> {
        let found = self.store.find_orphans();
        let mut cleaned = OrphanReport::default();

        for name in found.untracked_dirs {
            let lock = self.plugin_lock(&name);
            let _guard = lock.lock().await;

            // An install may have recorded it since the scan.
            if self.store.is_installed(&name) {
                continue;
            }
            let dir = self.store.plugin_dir(&name);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!("Removed untracked plugin directory {}", dir.display());
                    cleaned.untracked_dirs.push(name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
        }

        for name in found.dangling_records {
            let lock = self.plugin_lock(&name);
            let _guard = lock.lock().await;

            // An install may be mid-swap, or may have put the directory back.
            let removed = self.store.update_installed_state(|state| {
                Ok(!self.store.has_plugin_dir(&name) && state.remove(&name).is_some())
            })?;
            if removed {
                warn!("Dropped record for {}: plugin directory is missing", name);
                cleaned.dangling_records.push(name);
            }
        }

        Ok(cleaned)
    }

    /// Drop every record without a directory. Only safe while no install runs.
    fn heal_dangling_records(&self) -> Result<Vec<String>> {
        if self.store.find_orphans().dangling_records.is_empty() {
            return Ok(Vec::new());
        }

        let removed = self.store.update_installed_state(|state| {
            let dangling: Vec<String> = state
                .names()
                .filter(|name| !self.store.has_plugin_dir(name))
                .map(String::from)
                .collect();
            for name in &dangling {
                state.remove(name);
            }
            Ok(dangling)
        })?;

        for name in &removed {
            warn!("Dropped record for {}: plugin directory is missing", name);
        }
        debug!("Healed {} dangling record(s)", removed.len());
        Ok(removed)
    }

    /// Remove whatever is left in the temp directory. Every install removes
    /// its own workspace, so anything present at start-up is from a crash.
    fn sweep_stale_workspaces(&self) {
        let temp_dir = self.paths.temp_dir();
        let entries = match std::fs::read_dir(&temp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {}: {}", temp_dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(kind) if kind.is_dir() => std::fs::remove_dir_all(&path),
                _ => std::fs::remove_file(&path),
            };
            match result {
                Ok(()) => info!("Removed stale install workspace {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;
    use std::time::Duration;
    use tempfile::TempDir;

    fn install_by_hand(manager: &PluginLifecycleManager, name: &str, version: &str, enabled: bool) {
        std::fs::create_dir_all(manager.store().plugin_dir(name)).unwrap();
        manager
            .store()
            .write_version(name, &Version::parse(version))
            .unwrap();
        manager
            .store()
            .update_installed_state(|state| {
                state.mark_installed(name);
                if let Some(record) = state.plugins.get_mut(name) {
                    record.enabled = enabled;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_new_creates_layout_and_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();

        assert!(manager.paths().plugins_dir().is_dir());
        assert!(manager.paths().config_file().is_file());
        assert!(manager.list_enabled_plugins().is_empty());
    }

    #[test]
    fn test_new_heals_dangling_records() {
        let temp_dir = TempDir::new().unwrap();
        {
            let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
            install_by_hand(&manager, "chronos", "1.0.0", true);
            install_by_hand(&manager, "notes", "1.0.0", true);
            std::fs::remove_dir_all(manager.store().plugin_dir("notes")).unwrap();
        }

        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        let state = manager.store().read_installed_state();
        assert!(state.is_installed("chronos"));
        assert!(!state.is_installed("notes"));
    }

    #[test]
    fn test_new_sweeps_stale_workspaces() {
        let temp_dir = TempDir::new().unwrap();
        let temp_root = LauncherPaths::new(temp_dir.path()).temp_dir();
        let stale = temp_root.join("chronos-a1b2c3");
        std::fs::create_dir_all(stale.join("previous")).unwrap();
        std::fs::write(stale.join("previous").join("app.txt"), "old").unwrap();
        std::fs::write(stale.join("package"), b"PK").unwrap();
        std::fs::write(temp_root.join(".tmp8f2k1"), b"").unwrap();

        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();

        assert!(manager.paths().temp_dir().is_dir());
        assert_eq!(std::fs::read_dir(manager.paths().temp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        install_by_hand(&manager, "chronos", "1.0.0", true);

        assert!(!manager.toggle("chronos").unwrap());
        assert!(manager.list_enabled_plugins().is_empty());
        assert!(manager.toggle("chronos").unwrap());
        assert_eq!(manager.list_enabled_plugins(), vec!["chronos".to_string()]);
    }

    #[test]
    fn test_enable_requires_record() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();

        assert!(matches!(
            manager.enable("chronos"),
            Err(LauncherError::NotInstalled { .. })
        ));
        assert!(matches!(
            manager.toggle("chronos"),
            Err(LauncherError::NotInstalled { .. })
        ));
        assert!(!manager.paths().installed_state_file().exists());
    }

    #[test]
    fn test_catalog_view_and_needs_update() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        install_by_hand(&manager, "chronos", "1.0.0", false);

        let catalog = Catalog::new(vec![
            CatalogEntry::new("chronos", "1.1.0", "http://x/chronos.zip"),
            CatalogEntry::new("notes", "2.0.0", "http://x/notes.zip"),
        ]);

        let view = manager.effective_catalog_view(&catalog);
        assert_eq!(view.len(), 2);
        assert!(view[0].installed && view[0].has_update && !view[0].enabled);
        assert_eq!(view[0].local_version, Version::new(1, 0, 0));
        assert!(!view[1].installed && !view[1].has_update && !view[1].enabled);
        assert_eq!(view[1].local_version, Version::ZERO);

        assert!(manager.needs_update("chronos", &catalog));
        assert!(!manager.needs_update("notes", &catalog));

        manager
            .store()
            .write_version("chronos", &Version::new(1, 1, 0))
            .unwrap();
        assert!(!manager.needs_update("chronos", &catalog));
        assert!(!manager.effective_catalog_view(&catalog)[0].has_update);
    }

    #[tokio::test]
    async fn test_install_unknown_plugin_reports_completion() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);

        let result = manager
            .install(
                "ghost",
                &Catalog::default(),
                &ProgressReporter::new(tx),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(LauncherError::NotInCatalog { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(ProgressUpdate::Completed { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_requires_installed() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        let catalog = Catalog::new(vec![CatalogEntry::new(
            "chronos",
            "1.0.0",
            "http://127.0.0.1:9/chronos.zip",
        )]);

        let result = manager
            .update(
                "chronos",
                &catalog,
                &ProgressReporter::disabled(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(LauncherError::NotInstalled { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        install_by_hand(&manager, "chronos", "1.0.0", true);
        install_by_hand(&manager, "notes", "1.0.0", true);
        std::fs::create_dir_all(manager.store().plugin_dir("leftover")).unwrap();
        std::fs::remove_dir_all(manager.store().plugin_dir("notes")).unwrap();

        let report = manager.cleanup_orphans().await.unwrap();

        assert_eq!(report.untracked_dirs, vec!["leftover".to_string()]);
        assert_eq!(report.dangling_records, vec!["notes".to_string()]);
        assert!(manager.store().find_orphans().is_clean());
        assert!(manager.store().has_plugin_dir("chronos"));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_record_of_plugin_being_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(PluginLifecycleManager::new(temp_dir.path()).unwrap());
        install_by_hand(&manager, "chronos", "1.0.0", false);
        let plugin_dir = manager.store().plugin_dir("chronos");
        let aside = temp_dir.path().join("aside");

        // An update between its two renames, holding the plugin's lock.
        let lock = manager.plugin_lock("chronos");
        let guard = lock.lock().await;
        std::fs::rename(&plugin_dir, &aside).unwrap();

        let cleanup = tokio::spawn({
            let manager = manager.clone();
            async move { manager.cleanup_orphans().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cleanup.is_finished());
        assert!(manager.store().is_installed("chronos"));

        std::fs::rename(&aside, &plugin_dir).unwrap();
        drop(guard);

        let report = cleanup.await.unwrap().unwrap();
        assert!(report.dangling_records.is_empty());
        assert!(manager.store().is_installed("chronos"));
        assert!(!manager.store().is_enabled("chronos"));
    }

    #[test]
    fn test_set_config_persists() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        manager
            .set_config("catalog_url", "https://example.org/catalog.json")
            .unwrap();
        assert!(manager.set_config("catalog_url", "not a url").is_err());

        let reopened = PluginLifecycleManager::new(temp_dir.path()).unwrap();
        assert_eq!(
            reopened.config().remote.catalog_url,
            "https://example.org/catalog.json"
        );
    }
}
