//! Launcher self-update check.
//!
//! The launcher compares its own version file against the remote manifest and
//! reports whether a newer release exists. Applying the update is left to the
//! user.

mod updater;

pub use updater::{LauncherUpdateCheck, LauncherUpdater};
