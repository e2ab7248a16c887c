//! Data types shared across the launcher core.

pub mod catalog;
pub mod plugin;
pub mod version;

pub use catalog::{Catalog, CatalogEntry, Manifest};
pub use plugin::{
    validate_plugin_name, InstalledState, OrphanReport, PluginRecord, PluginView,
    MAX_PLUGIN_NAME_LEN,
};
pub use version::{compare_versions, Version};
