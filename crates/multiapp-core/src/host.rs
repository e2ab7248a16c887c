//! Plugin host.
//!
//! Plugins expose one capability, [`PluginEntry::render`], registered by name
//! in a [`PluginRegistry`]. The host decides which of those entries may run:
//! only plugins that are installed, enabled and present on disk are
//! discovered. Every way a plugin can fail to load or render comes back as a
//! [`PluginLoadError`], never as a panic in the host.

use crate::error::PluginLoadError;
use crate::metadata::LocalPluginStore;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Area a plugin renders its interface into.
pub trait RenderSurface {
    /// Remove everything previously rendered.
    fn clear(&mut self);

    /// Append a line of text.
    fn add_text(&mut self, text: &str);
}

/// A [`RenderSurface`] that collects lines in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSurface {
    lines: Vec<String>,
}

impl TextSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl RenderSurface for TextSurface {
    fn clear(&mut self) {
        self.lines.clear();
    }

    fn add_text(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

/// Render entry point of a plugin.
pub trait PluginEntry: Send + Sync {
    fn render(&self, surface: &mut dyn RenderSurface) -> anyhow::Result<()>;
}

/// Entry points known to this process, by plugin name.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    entries: BTreeMap<String, Arc<dyn PluginEntry>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, entry: Arc<dyn PluginEntry>) {
        let name = name.into();
        if self.entries.insert(name.clone(), entry).is_some() {
            debug!("Replaced entry point for {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginEntry>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Result of a discovery pass.
pub struct PluginHost {
    loaded: BTreeMap<String, Arc<dyn PluginEntry>>,
    failed: Vec<PluginLoadError>,
}

impl PluginHost {
    /// Resolve entry points for every enabled plugin with a directory on disk.
    ///
    /// Plugins without a registered entry point are recorded as
    /// [`PluginLoadError::EntryPointMissing`] and skipped.
    pub fn discover(registry: &PluginRegistry, store: &LocalPluginStore) -> Self {
        let state = store.read_installed_state();
        let on_disk = store.list_installed_dirs();

        let mut loaded = BTreeMap::new();
        let mut failed = Vec::new();

        for name in state.names().filter(|name| state.is_enabled(name)) {
            if !on_disk.contains(name) {
                debug!("Skipping {}: no plugin directory", name);
                continue;
            }
            match registry.get(name) {
                Some(entry) => {
                    loaded.insert(name.to_string(), entry);
                }
                None => {
                    warn!("Plugin {} is enabled but has no entry point", name);
                    failed.push(PluginLoadError::EntryPointMissing {
                        name: name.to_string(),
                    });
                }
            }
        }

        info!(
            "Discovered {} plugin(s), {} without entry point",
            loaded.len(),
            failed.len()
        );
        Self { loaded, failed }
    }

    /// Names of discovered plugins, sorted.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    pub fn failures(&self) -> &[PluginLoadError] {
        &self.failed
    }

    /// Clear `surface` and let plugin `name` render into it.
    pub fn render(
        &self,
        name: &str,
        surface: &mut dyn RenderSurface,
    ) -> std::result::Result<(), PluginLoadError> {
        let entry = match self.loaded.get(name) {
            Some(entry) => entry,
            None if self.failed.iter().any(|e| e.plugin_name() == name) => {
                return Err(PluginLoadError::EntryPointMissing {
                    name: name.to_string(),
                })
            }
            None => {
                return Err(PluginLoadError::NotDiscovered {
                    name: name.to_string(),
                })
            }
        };

        surface.clear();
        match catch_unwind(AssertUnwindSafe(|| entry.render(surface))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Plugin {} failed to render: {:#}", name, e);
                Err(PluginLoadError::RenderFailed {
                    name: name.to_string(),
                    message: format!("{:#}", e),
                })
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Plugin {} panicked: {}", name, message);
                Err(PluginLoadError::RenderPanicked {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherPaths;
    use tempfile::TempDir;

    struct Greeting;

    impl PluginEntry for Greeting {
        fn render(&self, surface: &mut dyn RenderSurface) -> anyhow::Result<()> {
            surface.add_text("hello");
            Ok(())
        }
    }

    struct Failing;

    impl PluginEntry for Failing {
        fn render(&self, _surface: &mut dyn RenderSurface) -> anyhow::Result<()> {
            anyhow::bail!("missing input")
        }
    }

    struct Panicking;

    impl PluginEntry for Panicking {
        fn render(&self, _surface: &mut dyn RenderSurface) -> anyhow::Result<()> {
            panic!("boom")
        }
    }

    fn store_with(temp_dir: &TempDir, plugins: &[(&str, bool)]) -> LocalPluginStore {
        let paths = LauncherPaths::new(temp_dir.path());
        paths.ensure_dirs().unwrap();
        let store = LocalPluginStore::new(paths);
        store
            .update_installed_state(|state| {
                for (name, enabled) in plugins {
                    state.mark_installed(name);
                    if let Some(record) = state.plugins.get_mut(*name) {
                        record.enabled = *enabled;
                    }
                }
                Ok(())
            })
            .unwrap();
        for (name, _) in plugins {
            std::fs::create_dir_all(store.plugin_dir(name)).unwrap();
        }
        store
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register("greeting", Arc::new(Greeting));
        registry.register("failing", Arc::new(Failing));
        registry.register("panicking", Arc::new(Panicking));
        registry.register("disabled", Arc::new(Greeting));
        registry
    }

    #[test]
    fn test_discover_only_enabled_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(
            &temp_dir,
            &[("greeting", true), ("disabled", false), ("unknown", true)],
        );

        let host = PluginHost::discover(&registry(), &store);

        assert_eq!(host.loaded(), vec!["greeting".to_string()]);
        assert_eq!(host.failures().len(), 1);
        assert_eq!(host.failures()[0].plugin_name(), "unknown");
    }

    #[test]
    fn test_render_into_surface() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, &[("greeting", true)]);
        let host = PluginHost::discover(&registry(), &store);

        let mut surface = TextSurface::new();
        surface.add_text("stale");
        host.render("greeting", &mut surface).unwrap();
        assert_eq!(surface.lines(), ["hello".to_string()]);
    }

    #[test]
    fn test_render_errors_are_values() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(
            &temp_dir,
            &[("failing", true), ("panicking", true), ("unknown", true)],
        );
        let host = PluginHost::discover(&registry(), &store);
        let mut surface = TextSurface::new();

        assert!(matches!(
            host.render("failing", &mut surface),
            Err(PluginLoadError::RenderFailed { .. })
        ));
        assert!(matches!(
            host.render("panicking", &mut surface),
            Err(PluginLoadError::RenderPanicked { message, .. }) if message == "boom"
        ));
        assert!(matches!(
            host.render("unknown", &mut surface),
            Err(PluginLoadError::EntryPointMissing { .. })
        ));
        assert!(matches!(
            host.render("never-installed", &mut surface),
            Err(PluginLoadError::NotDiscovered { .. })
        ));
    }
}
