use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Ids of items whose corpus write has durably succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCheckpoint {
    #[serde(default)]
    pub processed_ids: BTreeSet<String>,
}

impl ProgressCheckpoint {
    /// Read a checkpoint side file. Missing or unreadable files start fresh.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable checkpoint {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cp) => cp,
            Err(e) => {
                log::warn!("Ignoring malformed checkpoint {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.processed_ids.contains(item_id)
    }

    pub fn insert(&mut self, item_id: &str) -> bool {
        self.processed_ids.insert(item_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_ids.is_empty()
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        crate::storage::write_json_atomic(path, self).map_err(|e| IngestError::persistence(path, e))
    }

    /// Remove the side file; absent is fine.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::persistence(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persist_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".import-progress.json");
        let mut cp = ProgressCheckpoint::default();
        cp.insert("v2");
        cp.insert("v1");
        cp.persist(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"processedIds\""));
        assert_eq!(ProgressCheckpoint::load(&path), cp);
    }

    #[test]
    fn test_missing_or_corrupt_starts_empty() {
        let temp = TempDir::new().unwrap();
        assert!(ProgressCheckpoint::load(&temp.path().join("nope.json")).is_empty());

        let path = temp.path().join("bad.json");
        std::fs::write(&path, "{processed").unwrap();
        assert!(ProgressCheckpoint::load(&path).is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cp.json");
        ProgressCheckpoint::default().persist(&path).unwrap();
        ProgressCheckpoint::remove(&path).unwrap();
        ProgressCheckpoint::remove(&path).unwrap();
        assert!(!path.exists());
    }
}
