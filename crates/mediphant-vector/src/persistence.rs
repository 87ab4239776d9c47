//! Snapshot persistence for the local vector store.
//!
//! Each index is stored as one pretty-printed JSON file,
//! `<data_dir>/<index>.json`, holding the index definition and its entries
//! in insertion order. Writes go to a temporary file that is then renamed
//! over the snapshot, so a crash mid-write leaves the previous snapshot
//! intact.

use std::path::{Path, PathBuf};

use mediphant_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::{IndexEntry, IndexSpec};

/// On-disk form of one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index definition as created.
    pub spec: IndexSpec,

    /// Entries in insertion order.
    pub entries: Vec<IndexEntry>,

    /// Save timestamp (RFC 3339).
    pub saved_at: String,
}

impl IndexSnapshot {
    /// Build a snapshot stamped with the current time.
    pub fn new(spec: IndexSpec, entries: Vec<IndexEntry>) -> Self {
        Self {
            spec,
            entries,
            saved_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Path of the snapshot for `index` under `data_dir`.
///
/// Index names are restricted to ASCII letters, digits, `-` and `_` so they
/// cannot escape the data directory.
pub fn snapshot_path(data_dir: &Path, index: &str) -> Result<PathBuf> {
    validate_index_name(index)?;
    Ok(data_dir.join(format!("{index}.json")))
}

/// Reject names that are empty or contain characters outside `[A-Za-z0-9_-]`.
pub fn validate_index_name(index: &str) -> Result<()> {
    if index.is_empty()
        || !index
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::config(format!(
            "invalid index name '{index}': use letters, digits, '-' or '_'"
        )));
    }
    Ok(())
}

/// Save a snapshot, creating `path`'s parent directory if needed.
pub fn save_snapshot(path: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| Error::io_with_path(e, &tmp))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io_with_path(e, path))?;
    Ok(())
}

/// Load a snapshot, or `None` if the file does not exist.
pub fn load_snapshot(path: &Path) -> Result<Option<IndexSnapshot>> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_with_path(e, path)),
    };
    let snapshot: IndexSnapshot = serde_json::from_str(&json)?;
    Ok(Some(snapshot))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_snapshot() -> IndexSnapshot {
        IndexSnapshot::new(
            IndexSpec::new("faq", 2).with_embedding_model("mock-bow"),
            vec![
                IndexEntry::new("first", vec![1.0, 0.0]).with_model("mock-bow"),
                IndexEntry::new("second", vec![0.0, 1.0]).with_model("mock-bow"),
            ],
        )
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let dir = tempdir().unwrap();
        let path = snapshot_path(dir.path(), "faq").unwrap();

        save_snapshot(&path, &sample_snapshot()).unwrap();
        let loaded = load_snapshot(&path).unwrap().unwrap();

        assert_eq!(loaded.spec.name, "faq");
        assert_eq!(loaded.spec.embedding_model.as_deref(), Some("mock-bow"));
        let texts: Vec<&str> = loaded.entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_creates_data_dir() {
        let dir = tempdir().unwrap();
        let path = snapshot_path(&dir.path().join("nested/store"), "faq").unwrap();
        save_snapshot(&path, &sample_snapshot()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_missing_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(load_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn test_snapshot_path_rejects_traversal() {
        let dir = tempdir().unwrap();
        assert!(snapshot_path(dir.path(), "../escape").unwrap_err().is_config());
        assert!(snapshot_path(dir.path(), "").is_err());
        assert!(snapshot_path(dir.path(), "faq-index_2").is_ok());
    }
}
