//! Install progress reporting.
//!
//! Updates travel over a tokio mpsc channel owned by the caller, so a
//! presentation loop consumes them on its own task instead of being called
//! from the install task.

use serde::Serialize;
use tokio::sync::mpsc;

/// Ordered steps of an install or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStep {
    /// Fetch the archive into a private temp directory.
    Download,
    /// Unpack the archive into staging.
    Extract,
    /// Swap the staged directory into `plugins/<name>`.
    Replace,
    /// Write the version marker and the installed-state record.
    Record,
}

impl InstallStep {
    pub fn label(&self) -> &'static str {
        match self {
            InstallStep::Download => "Downloading",
            InstallStep::Extract => "Extracting",
            InstallStep::Replace => "Replacing",
            InstallStep::Record => "Recording",
        }
    }
}

/// Progress update sent through channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressUpdate {
    /// A new step started.
    #[serde(rename_all = "camelCase")]
    StageChanged { name: String, step: InstallStep },
    /// Bytes received so far. `fraction` is only set when the total is known.
    #[serde(rename_all = "camelCase")]
    Download {
        name: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        fraction: Option<f64>,
    },
    /// Always the last update of an attempt, successful or not.
    #[serde(rename_all = "camelCase")]
    Completed {
        name: String,
        success: bool,
        message: Option<String>,
    },
}

impl ProgressUpdate {
    pub fn plugin_name(&self) -> &str {
        match self {
            ProgressUpdate::StageChanged { name, .. }
            | ProgressUpdate::Download { name, .. }
            | ProgressUpdate::Completed { name, .. } => name,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ProgressUpdate::Completed { .. })
    }
}

/// Sending half handed to the installer. Without a channel, updates are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Deliver an update, waiting for channel capacity.
    pub async fn send(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update).await;
        }
    }

    /// Deliver an update only if the channel has room.
    ///
    /// Used for download ticks, where a newer tick replaces a dropped one.
    /// Returns whether the update was delivered; without a channel there is
    /// nothing to deliver to, which counts as delivered.
    pub fn try_send(&self, update: ProgressUpdate) -> bool {
        match &self.tx {
            Some(tx) => tx.try_send(update).is_ok(),
            None => true,
        }
    }
}
