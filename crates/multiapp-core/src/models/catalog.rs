//! Remote catalog and manifest documents.

use super::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One installable plugin as advertised by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: Version,
    #[serde(rename = "url")]
    pub download_url: String,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, version: &str, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::parse(version),
            download_url: download_url.into(),
        }
    }
}

/// Root structure of `catalog.json`.
///
/// The remote side does not enforce unique names; lookups and
/// [`Catalog::entries`] resolve duplicates to the last-seen entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub apps: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(apps: Vec<CatalogEntry>) -> Self {
        Self { apps }
    }

    /// Entries with duplicates collapsed.
    ///
    /// Each name keeps the position of its first occurrence and the values of
    /// its last one.
    pub fn entries(&self) -> Vec<&CatalogEntry> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut entries: Vec<&CatalogEntry> = Vec::with_capacity(self.apps.len());

        for entry in &self.apps {
            match positions.get(entry.name.as_str()) {
                Some(&index) => entries[index] = entry,
                None => {
                    positions.insert(entry.name.as_str(), entries.len());
                    entries.push(entry);
                }
            }
        }

        entries
    }

    /// Last-seen entry for `name`.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.apps.iter().rev().find(|entry| entry.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Root structure of `manifest.json`: the launcher's own latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_document() {
        let catalog: Catalog = serde_json::from_str(
            r#"{"apps": [{"name": "chronos", "version": "1.1.0", "url": "http://x/chronos.zip"}]}"#,
        )
        .unwrap();

        assert_eq!(catalog.apps.len(), 1);
        assert_eq!(catalog.apps[0].version, Version::new(1, 1, 0));
        assert_eq!(catalog.apps[0].download_url, "http://x/chronos.zip");
    }

    #[test]
    fn test_missing_apps_is_empty() {
        let catalog: Catalog = serde_json::from_str("{}").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_duplicates_resolve_to_last_seen() {
        let catalog = Catalog::new(vec![
            CatalogEntry::new("chronos", "1.0.0", "http://x/old.zip"),
            CatalogEntry::new("notes", "0.1.0", "http://x/notes.zip"),
            CatalogEntry::new("chronos", "1.2.0", "http://x/new.zip"),
        ]);

        let entries = catalog.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "chronos");
        assert_eq!(entries[0].download_url, "http://x/new.zip");
        assert_eq!(entries[1].name, "notes");

        assert_eq!(catalog.get("chronos").unwrap().version, Version::new(1, 2, 0));
        assert!(catalog.get("missing").is_none());
    }
}
