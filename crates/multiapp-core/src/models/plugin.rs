//! Local plugin state types.

use super::version::Version;
use crate::error::{LauncherError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest accepted plugin name.
pub const MAX_PLUGIN_NAME_LEN: usize = 64;

/// Persisted record for one installed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for PluginRecord {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_enabled() -> bool {
    true
}

/// Root structure of `installed.json`: plugin name to record.
///
/// A name is installed exactly when it has a key here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstalledState {
    pub plugins: BTreeMap<String, PluginRecord>,
}

impl InstalledState {
    pub fn is_installed(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Enabled flag, false when not installed.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    /// Record a successful install. An existing record keeps its flag.
    pub fn mark_installed(&mut self, name: &str) -> PluginRecord {
        *self.plugins.entry(name.to_string()).or_default()
    }

    pub fn remove(&mut self, name: &str) -> Option<PluginRecord> {
        self.plugins.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

/// Read model row rendered by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginView {
    pub name: String,
    /// `0.0.0` when the plugin has no version marker.
    pub local_version: Version,
    pub remote_version: Version,
    pub installed: bool,
    pub enabled: bool,
    pub has_update: bool,
}

/// Disagreements between `installed.json` and the plugins directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    /// Directories on disk with no state record.
    pub untracked_dirs: Vec<String>,
    /// State records whose directory is missing.
    pub dangling_records: Vec<String>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.untracked_dirs.is_empty() && self.dangling_records.is_empty()
    }
}

/// Check that `name` can be used as a single directory name under `plugins/`.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    let invalid = |message: &str| LauncherError::Validation {
        field: "name".to_string(),
        message: format!("'{}' {}", name, message),
    };

    if name.is_empty() {
        return Err(invalid("is empty"));
    }
    if name.len() > MAX_PLUGIN_NAME_LEN {
        return Err(invalid("is too long"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("may only contain ASCII letters, digits, '-', '_' and '.'"));
    }

    Ok(())
}
