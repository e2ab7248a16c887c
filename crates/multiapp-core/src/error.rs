//! Error types for the multiapp launcher core.
//!
//! Every failure a lifecycle operation can hit is a variant of
//! [`LauncherError`]. None of them are fatal: callers report them and carry on.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launcher core.
#[derive(Debug, Error)]
pub enum LauncherError {
    // Remote errors
    #[error("Failed to fetch {url}: {message}")]
    RemoteFetch { url: String, message: String },

    // Installation errors
    #[error("Installation of {name} failed: {message}")]
    Install { name: String, message: String },

    #[error("Installation of {name} cancelled")]
    InstallCancelled { name: String },

    #[error("Plugin not installed: {name}")]
    NotInstalled { name: String },

    #[error("Plugin not found in catalog: {name}")]
    NotInCatalog { name: String },

    // Local state errors
    #[error("Installed state at {path} is unreadable: {message}")]
    StateCorruption { path: PathBuf, message: String },

    // Plugin host errors
    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Failures to locate or invoke a plugin's render entry point.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("Plugin {name} is not installed or not enabled")]
    NotDiscovered { name: String },

    #[error("Plugin {name} has no registered entry point")]
    EntryPointMissing { name: String },

    #[error("Plugin {name} failed to render: {message}")]
    RenderFailed { name: String, message: String },

    #[error("Plugin {name} panicked while rendering: {message}")]
    RenderPanicked { name: String, message: String },
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(err: std::io::Error) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LauncherError {
    fn from(err: serde_json::Error) -> Self {
        LauncherError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LauncherError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap any error as an installation failure for `name`.
    pub fn install(name: &str, cause: impl std::fmt::Display) -> Self {
        LauncherError::Install {
            name: name.to_string(),
            message: cause.to_string(),
        }
    }

    /// Name of the plugin this error concerns, if any.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            LauncherError::Install { name, .. }
            | LauncherError::InstallCancelled { name }
            | LauncherError::NotInstalled { name }
            | LauncherError::NotInCatalog { name } => Some(name),
            LauncherError::PluginLoad(err) => Some(err.plugin_name()),
            _ => None,
        }
    }
}

impl PluginLoadError {
    pub fn plugin_name(&self) -> &str {
        match self {
            PluginLoadError::NotDiscovered { name }
            | PluginLoadError::EntryPointMissing { name }
            | PluginLoadError::RenderFailed { name, .. }
            | PluginLoadError::RenderPanicked { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LauncherError::Install {
            name: "chronos".into(),
            message: "bad archive".into(),
        };
        assert_eq!(err.to_string(), "Installation of chronos failed: bad archive");

        let err = LauncherError::RemoteFetch {
            url: "http://x/catalog.json".into(),
            message: "timed out".into(),
        };
        assert_eq!(err.to_string(), "Failed to fetch http://x/catalog.json: timed out");
    }

    #[test]
    fn test_plugin_load_error_is_transparent() {
        let err: LauncherError = PluginLoadError::EntryPointMissing {
            name: "chronos".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Plugin chronos has no registered entry point");
        assert_eq!(err.plugin_name(), Some("chronos"));
    }
}
