//! multiapp core - headless plugin lifecycle for the multiapp launcher.
//!
//! The crate resolves remote against local plugin versions, installs and
//! updates plugin packages so that a failure never leaves a half-installed
//! plugin behind, and keeps the installed set and enabled flags consistent on
//! disk. It has no presentation layer; the `multiapp` binary is one client.
//!
//! # Example
//!
//! ```rust,ignore
//! use multiapp_core::{CancellationToken, PluginLifecycleManager, ProgressReporter};
//!
//! #[tokio::main]
//! async fn main() -> multiapp_core::Result<()> {
//!     let manager = PluginLifecycleManager::new("/path/to/multiapp")?;
//!
//!     let catalog = manager.fetch_catalog().await?;
//!     for view in manager.effective_catalog_view(&catalog) {
//!         println!("{} {} -> {}", view.name, view.local_version, view.remote_version);
//!     }
//!
//!     manager
//!         .install("chronos", &catalog, &ProgressReporter::disabled(), &CancellationToken::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod host;
pub mod installer;
pub mod launcher;
pub mod manager;
pub mod metadata;
pub mod models;
pub mod network;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{LauncherConfig, LauncherPaths};
pub use error::{LauncherError, PluginLoadError, Result};
pub use host::{PluginEntry, PluginHost, PluginRegistry, RenderSurface, TextSurface};
pub use installer::{InstallStep, PackageInstaller, ProgressReporter, ProgressUpdate, StepHook};
pub use launcher::{LauncherUpdateCheck, LauncherUpdater};
pub use manager::PluginLifecycleManager;
pub use metadata::LocalPluginStore;
pub use models::{
    compare_versions, Catalog, CatalogEntry, InstalledState, Manifest, OrphanReport, PluginRecord,
    PluginView, Version,
};
pub use network::{DownloadOutcome, DownloadProgress, Downloader, RemoteCatalogClient};
