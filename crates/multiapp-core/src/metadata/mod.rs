//! Local persistence.
//!
//! This module provides:
//! - Atomic JSON and text file writes
//! - The plugin store for installed state and version markers

mod atomic;
mod store;

pub use atomic::{atomic_read_json, atomic_write_json, atomic_write_text};
pub use store::LocalPluginStore;
