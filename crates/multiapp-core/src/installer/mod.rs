//! Plugin package installation.
//!
//! An install or update runs these steps in order. A crash or failure between
//! any two of them leaves state the launcher can recover from:
//!
//! 1. Download the archive into a private directory under `.tmp/`
//! 2. Extract it into a staging directory next to the download
//! 3. Swap staging into `plugins/<name>` (rename aside, rename in)
//! 4. Write the version marker, then the installed-state record
//! 5. Remove the private directory, whatever happened
//!
//! Nothing visible to the rest of the launcher changes before step 3. Once
//! step 3 succeeds the install is committed: cancellation is no longer honored
//! and step 4 always runs.

mod archive;
mod progress;

pub use progress::{InstallStep, ProgressReporter, ProgressUpdate};

use crate::cancel::CancellationToken;
use crate::metadata::LocalPluginStore;
use crate::models::{validate_plugin_name, Version};
use crate::network::{DownloadOutcome, DownloadProgress, Downloader};
use crate::{LauncherError, Result};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Called before each uncommitted step (download, extract, replace).
///
/// Returning an error aborts the install exactly like a real failure at that
/// point would.
pub trait StepHook: Send + Sync {
    fn before_step(&self, name: &str, step: InstallStep) -> anyhow::Result<()>;
}

/// Downloads, stages and swaps plugin packages into place.
pub struct PackageInstaller {
    store: Arc<LocalPluginStore>,
    downloader: Downloader,
    hook: Option<Arc<dyn StepHook>>,
}

impl PackageInstaller {
    pub fn new(store: Arc<LocalPluginStore>) -> Result<Self> {
        Ok(Self {
            store,
            downloader: Downloader::new()?,
            hook: None,
        })
    }

    /// Use `downloader` instead of one with the default network settings.
    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_step_hook(mut self, hook: Arc<dyn StepHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn store(&self) -> &Arc<LocalPluginStore> {
        &self.store
    }

    /// Install `name` from `download_url`, recording `target_version`.
    ///
    /// On failure the plugin directory, its version marker and the installed
    /// state are what they were before the call. The one exception is a marker
    /// that cannot be written after the swap: the new directory stays and is
    /// recorded, and the plugin reads as version 0.0.0. Progress always ends
    /// with [`ProgressUpdate::Completed`].
    pub async fn install_or_update(
        &self,
        name: &str,
        download_url: &str,
        target_version: &Version,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Installing {} {} from {}", name, target_version, download_url);

        let result = self
            .install_in_workspace(name, download_url, target_version, progress, cancel)
            .await;

        match &result {
            Ok(()) => info!("Installed {} {}", name, target_version),
            Err(e) => warn!("Install of {} did not complete: {}", name, e),
        }

        progress
            .send(ProgressUpdate::Completed {
                name: name.to_string(),
                success: result.is_ok(),
                message: result.as_ref().err().map(|e| e.to_string()),
            })
            .await;

        result
    }

    async fn install_in_workspace(
        &self,
        name: &str,
        download_url: &str,
        target_version: &Version,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_plugin_name(name)?;
        let workspace = self.create_workspace(name)?;

        let result = self
            .run_steps(name, download_url, target_version, workspace.path(), progress, cancel)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("Failed to remove {}: {}", workspace_path.display(), e);
        }

        result
    }

    async fn run_steps(
        &self,
        name: &str,
        download_url: &str,
        target_version: &Version,
        workspace: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let archive_path = workspace.join("package");
        let staging_dir = workspace.join("staging");
        let plugin_dir = self.store.plugin_dir(name);

        // Step 1: Download
        self.enter_step(name, InstallStep::Download, progress, cancel).await?;
        let mut latest: Option<DownloadProgress> = None;
        let mut delivered: Option<DownloadProgress> = None;
        let outcome = self
            .downloader
            .download(download_url, &archive_path, cancel, |p| {
                latest = Some(p);
                if progress.try_send(download_update(name, p)) {
                    delivered = Some(p);
                }
            })
            .await
            .map_err(|e| LauncherError::install(name, e))?;
        if outcome == DownloadOutcome::Cancelled {
            return Err(LauncherError::InstallCancelled {
                name: name.to_string(),
            });
        }
        // Ticks may be dropped on a full channel, the last one must not be.
        if let Some(last) = latest.filter(|last| delivered != Some(*last)) {
            progress.send(download_update(name, last)).await;
        }

        // Step 2: Extract
        self.enter_step(name, InstallStep::Extract, progress, cancel).await?;
        {
            let archive_path = archive_path.clone();
            let staging_dir = staging_dir.clone();
            tokio::task::spawn_blocking(move || archive::extract(&archive_path, &staging_dir))
                .await
                .map_err(|e| LauncherError::install(name, e))?
                .map_err(|e| LauncherError::install(name, e))?;
        }

        // Step 3: Replace
        self.enter_step(name, InstallStep::Replace, progress, cancel).await?;
        swap_into_place(&staging_dir, &plugin_dir, &workspace.join("previous"))
            .map_err(|e| LauncherError::install(name, e))?;

        // Step 4: Record. Committed from here on.
        progress
            .send(ProgressUpdate::StageChanged {
                name: name.to_string(),
                step: InstallStep::Record,
            })
            .await;
        let marker = self.store.write_version(name, target_version);
        if let Err(e) = &marker {
            error!(
                "{} {} is in place but its version marker could not be written: {}",
                name, target_version, e
            );
        }
        let record = self
            .store
            .update_installed_state(|state| Ok(state.mark_installed(name)))
            .map_err(|e| {
                error!("{} is in place but could not be recorded: {}", name, e);
                LauncherError::install(name, e)
            })?;
        debug!("Recorded {} (enabled={})", name, record.enabled);

        marker.map_err(|e| {
            LauncherError::install(name, format!("installed with unrecorded version: {}", e))
        })
    }

    /// Cancellation and hook checkpoint, then announce the step.
    async fn enter_step(
        &self,
        name: &str,
        step: InstallStep,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(LauncherError::InstallCancelled {
                name: name.to_string(),
            });
        }
        if let Some(hook) = &self.hook {
            hook.before_step(name, step)
                .map_err(|e| LauncherError::install(name, format!("{:#}", e)))?;
        }

        progress
            .send(ProgressUpdate::StageChanged {
                name: name.to_string(),
                step,
            })
            .await;
        Ok(())
    }

    fn create_workspace(&self, name: &str) -> Result<TempDir> {
        let temp_root = self.store.paths().temp_dir();
        std::fs::create_dir_all(&temp_root)
            .map_err(|e| LauncherError::install(name, LauncherError::io_with_path(e, &temp_root)))?;

        tempfile::Builder::new()
            .prefix(&format!("{}-", name))
            .tempdir_in(&temp_root)
            .map_err(|e| LauncherError::install(name, LauncherError::io_with_path(e, &temp_root)))
    }

    /// Remove a plugin's directory and its state record.
    ///
    /// The record goes first, so a half-deleted directory is at worst an
    /// orphan. A missing directory or record is not an error.
    pub fn uninstall(&self, name: &str) -> Result<()> {
        validate_plugin_name(name)?;

        let removed = self.store.update_installed_state(|state| Ok(state.remove(name)))?;

        let plugin_dir = self.store.plugin_dir(name);
        match std::fs::remove_dir_all(&plugin_dir) {
            Ok(()) => info!("Removed {}", plugin_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No directory to remove for {}", name)
            }
            Err(e) => warn!("Failed to remove {}: {}", plugin_dir.display(), e),
        }

        if removed.is_some() {
            info!("Uninstalled {}", name);
        }
        Ok(())
    }
}

fn download_update(name: &str, p: DownloadProgress) -> ProgressUpdate {
    ProgressUpdate::Download {
        name: name.to_string(),
        downloaded_bytes: p.bytes_downloaded,
        total_bytes: p.total_bytes,
        fraction: p.fraction(),
    }
}

/// Move `staged` to `target`, putting any existing `target` at `displaced`.
///
/// If the second rename fails the previous directory is moved back. A crash
/// between the two renames leaves `target` missing; the previous contents are
/// then only in the temp directory.
fn swap_into_place(staged: &Path, target: &Path, displaced: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
    }

    let had_previous = target.symlink_metadata().is_ok();
    if had_previous {
        std::fs::rename(target, displaced).map_err(|e| LauncherError::Io {
            message: format!("Failed to move existing plugin directory aside: {}", e),
            path: Some(target.to_path_buf()),
            source: Some(e),
        })?;
    }

    if let Err(e) = std::fs::rename(staged, target) {
        if had_previous {
            if let Err(restore) = std::fs::rename(displaced, target) {
                error!(
                    "Failed to restore {} from {}: {}",
                    target.display(),
                    displaced.display(),
                    restore
                );
            }
        }
        return Err(LauncherError::Io {
            message: format!("Failed to move staged plugin into place: {}", e),
            path: Some(target.to_path_buf()),
            source: Some(e),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherPaths;

    #[test]
    fn test_swap_replaces_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let staged = temp_dir.path().join("staging");
        let target = temp_dir.path().join("plugins").join("chronos");
        let displaced = temp_dir.path().join("previous");

        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("old.txt"), "old").unwrap();
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::write(staged.join("new.txt"), "new").unwrap();

        swap_into_place(&staged, &target, &displaced).unwrap();

        assert!(target.join("new.txt").exists());
        assert!(!target.join("old.txt").exists());
        assert!(displaced.join("old.txt").exists());
        assert!(!staged.exists());
    }

    #[test]
    fn test_swap_restores_previous_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("plugins").join("chronos");
        let displaced = temp_dir.path().join("previous");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("old.txt"), "old").unwrap();

        // Staging never got created, so the second rename fails.
        let result = swap_into_place(&temp_dir.path().join("missing"), &target, &displaced);

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(target.join("old.txt")).unwrap(), "old");
    }

    #[test]
    fn test_uninstall_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LauncherPaths::new(temp_dir.path());
        paths.ensure_dirs().unwrap();
        let store = Arc::new(LocalPluginStore::new(paths));
        let installer = PackageInstaller::new(store.clone()).unwrap();

        std::fs::create_dir_all(store.plugin_dir("chronos")).unwrap();
        store
            .update_installed_state(|state| {
                state.mark_installed("chronos");
                state.mark_installed("notes");
                Ok(())
            })
            .unwrap();

        installer.uninstall("chronos").unwrap();
        let once = store.read_installed_state();
        installer.uninstall("chronos").unwrap();
        let twice = store.read_installed_state();

        assert_eq!(once, twice);
        assert!(!once.is_installed("chronos"));
        assert!(once.is_installed("notes"));
        assert!(!store.has_plugin_dir("chronos"));

        installer.uninstall("never-installed").unwrap();
        assert!(installer.uninstall("../etc").is_err());
    }
}
