//! In-memory vector store with optional snapshot persistence.
//!
//! `MemoryVectorStore` performs brute-force similarity search over every
//! entry of an index. It is the default local backend and the fake used in
//! tests. Indexes are ready as soon as they are created, and writes are
//! visible to the next query.
//!
//! When built with [`MemoryVectorStore::with_data_dir`], each index is
//! loaded lazily from `<data_dir>/<index>.json` and rewritten after every
//! change. A change becomes visible only after its snapshot is on disk, so
//! a failed write leaves the served index untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mediphant_core::{Error, Result};
use tokio::sync::RwLock;

use crate::persistence::{IndexSnapshot, load_snapshot, save_snapshot, snapshot_path};
use crate::store::VectorStore;
use crate::types::{IndexDescription, IndexEntry, IndexSpec, Match};

/// One index: its definition plus entries in insertion order.
#[derive(Debug, Clone)]
struct MemoryIndex {
    spec: IndexSpec,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl MemoryIndex {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = Self::new(snapshot.spec);
        for entry in snapshot.entries {
            index.put(entry);
        }
        index
    }

    /// Insert or overwrite by id. An overwrite keeps the original position.
    fn put(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn describe(&self) -> IndexDescription {
        IndexDescription {
            name: self.spec.name.clone(),
            dimension: self.spec.dimension,
            metric: self.spec.metric,
            ready: true,
            embedding_model: self.spec.embedding_model.clone(),
            entry_count: Some(self.entries.len()),
        }
    }

    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot::new(self.spec.clone(), self.entries.clone())
    }
}

/// Brute-force vector store held in memory.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
    data_dir: Option<PathBuf>,
}

impl MemoryVectorStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists each index under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            indexes: RwLock::default(),
            data_dir: Some(data_dir.into()),
        }
    }

    /// Directory snapshots are written to, if any.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Number of entries in `index`, or `None` if the index is unknown.
    pub async fn len(&self, index: &str) -> Option<usize> {
        self.load_if_present(index).await.ok()?;
        self.indexes.read().await.get(index).map(|i| i.entries.len())
    }

    async fn load_if_present(&self, index: &str) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        if self.indexes.read().await.contains_key(index) {
            return Ok(());
        }

        let path = snapshot_path(dir, index)?;
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(index) {
            return Ok(());
        }
        let read_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || load_snapshot(&read_path))
            .await
            .map_err(|e| Error::io_with_path(std::io::Error::other(e), &path))??;
        if let Some(snapshot) = loaded {
            log::debug!(
                "Loaded index '{index}' ({} entries) from {}",
                snapshot.entries.len(),
                path.display()
            );
            indexes.insert(index.to_string(), MemoryIndex::from_snapshot(snapshot));
        }
        Ok(())
    }

    /// Write `index` to its snapshot file off the async runtime.
    ///
    /// Callers hold the write lock across this call so snapshots land in
    /// the same order as the changes they record.
    async fn persist(&self, index: &MemoryIndex) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = snapshot_path(dir, &index.spec.name)?;
        let snapshot = index.snapshot();
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || save_snapshot(&write_path, &snapshot))
            .await
            .map_err(|e| Error::io_with_path(std::io::Error::other(e), &path))?
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        self.load_if_present(name).await?;
        Ok(self.indexes.read().await.get(name).map(MemoryIndex::describe))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        self.load_if_present(&spec.name).await?;
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&spec.name) {
            return Ok(());
        }
        let index = MemoryIndex::new(spec.clone());
        self.persist(&index).await?;
        indexes.insert(spec.name.clone(), index);
        Ok(())
    }

    async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
        self.load_if_present(index).await?;
        let mut indexes = self.indexes.write().await;
        let target = indexes
            .get_mut(index)
            .ok_or_else(|| Error::not_found(format!("index '{index}'")))?;

        for entry in entries {
            if entry.dimension() != target.spec.dimension {
                return Err(Error::config(format!(
                    "entry {} has dimension {}, index '{index}' expects {}",
                    entry.id,
                    entry.dimension(),
                    target.spec.dimension
                )));
            }
        }
        if self.data_dir.is_none() {
            for entry in entries {
                target.put(entry.clone());
            }
            return Ok(entries.len());
        }

        let mut staged = target.clone();
        for entry in entries {
            staged.put(entry.clone());
        }
        self.persist(&staged).await?;
        *target = staged;
        Ok(entries.len())
    }

    async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        self.load_if_present(index).await?;
        let indexes = self.indexes.read().await;
        let target = indexes
            .get(index)
            .ok_or_else(|| Error::not_found(format!("index '{index}'")))?;

        if vector.len() != target.spec.dimension {
            return Err(Error::config(format!(
                "query vector has dimension {}, index '{index}' expects {}",
                vector.len(),
                target.spec.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let metric = target.spec.metric;
        let mut scored: Vec<(f32, &IndexEntry)> = target
            .entries
            .iter()
            .map(|entry| (metric.score(vector, &entry.vector), entry))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| Match::new(entry.text.clone(), score))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Metric, ReadinessPolicy};
    use tempfile::tempdir;

    async fn store_with(entries: &[(&str, Vec<f32>)]) -> MemoryVectorStore {
        let store = MemoryVectorStore::new();
        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(2);
        store
            .create_index(&IndexSpec::new("faq", dimension))
            .await
            .unwrap();
        let entries: Vec<IndexEntry> = entries
            .iter()
            .map(|(t, v)| IndexEntry::new(*t, v.clone()))
            .collect();
        store.upsert_batch("faq", &entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_describe_missing_index() {
        let store = MemoryVectorStore::new();
        assert!(store.describe_index("faq").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_created_index_is_ready() {
        let store = MemoryVectorStore::new();
        let spec = IndexSpec::new("faq", 3).with_embedding_model("mock-bow");
        let description = store
            .ensure_index(&spec, &ReadinessPolicy::default())
            .await
            .unwrap();
        assert!(description.ready);
        assert_eq!(description.dimension, 3);
        assert_eq!(description.entry_count, Some(0));
        assert_eq!(description.embedding_model.as_deref(), Some("mock-bow"));
    }

    #[tokio::test]
    async fn test_query_orders_by_descending_score() {
        let store = store_with(&[
            ("east", vec![1.0, 0.0]),
            ("north", vec![0.0, 1.0]),
            ("north-east", vec![1.0, 1.0]),
        ])
        .await;

        let matches = store.query("faq", &[1.0, 0.1], 3).await.unwrap();
        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["east", "north-east", "north"]);
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let store = store_with(&[
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.9, 0.1]),
            ("c", vec![0.8, 0.2]),
            ("d", vec![0.7, 0.3]),
        ])
        .await;

        assert_eq!(store.query("faq", &[1.0, 0.0], 3).await.unwrap().len(), 3);
        assert_eq!(store.query("faq", &[1.0, 0.0], 10).await.unwrap().len(), 4);
        assert!(store.query("faq", &[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = store_with(&[
            ("first", vec![1.0, 0.0]),
            ("second", vec![1.0, 0.0]),
            ("third", vec![1.0, 0.0]),
        ])
        .await;

        // Identical vectors with distinct texts tie on score.
        let matches = store.query("faq", &[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_reupsert_overwrites_in_place() {
        let store = store_with(&[("alpha", vec![1.0, 0.0]), ("beta", vec![0.0, 1.0])]).await;
        store
            .upsert_batch("faq", &[IndexEntry::new("alpha", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.len("faq").await, Some(2));
        let matches = store.query("faq", &[0.0, 1.0], 2).await.unwrap();
        // Both now tie; "alpha" was inserted first.
        assert_eq!(matches[0].text, "alpha");
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let store = store_with(&[("a", vec![1.0, 0.0])]).await;
        let err = store.query("faq", &[1.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_query_missing_index() {
        let store = MemoryVectorStore::new();
        let err = store.query("faq", &[1.0], 3).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_batch_rejects_wrong_dimension() {
        let store = store_with(&[("a", vec![1.0, 0.0])]).await;
        let err = store
            .upsert_batch("faq", &[IndexEntry::new("b", vec![1.0])])
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(store.len("faq").await, Some(1));
    }

    #[tokio::test]
    async fn test_euclidean_metric() {
        let store = MemoryVectorStore::new();
        store
            .create_index(&IndexSpec::new("faq", 2).with_metric(Metric::Euclidean))
            .await
            .unwrap();
        store
            .upsert_batch(
                "faq",
                &[
                    IndexEntry::new("near", vec![1.0, 1.0]),
                    IndexEntry::new("far", vec![5.0, 5.0]),
                ],
            )
            .await
            .unwrap();

        let matches = store.query("faq", &[1.0, 1.0], 2).await.unwrap();
        assert_eq!(matches[0].text, "near");
        assert_eq!(matches[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryVectorStore::with_data_dir(dir.path());
            store
                .create_index(&IndexSpec::new("faq", 2))
                .await
                .unwrap();
            store
                .upsert_batch(
                    "faq",
                    &[
                        IndexEntry::new("first", vec![1.0, 0.0]),
                        IndexEntry::new("second", vec![0.0, 1.0]),
                    ],
                )
                .await
                .unwrap();
        }

        let reopened = MemoryVectorStore::with_data_dir(dir.path());
        let description = reopened.describe_index("faq").await.unwrap().unwrap();
        assert_eq!(description.entry_count, Some(2));

        let matches = reopened.query("faq", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(matches[0].text, "second");
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_index_unchanged() {
        let dir = tempdir().unwrap();
        let store = MemoryVectorStore::with_data_dir(dir.path());
        store
            .create_index(&IndexSpec::new("faq", 2))
            .await
            .unwrap();
        store
            .upsert_batch("faq", &[IndexEntry::new("kept", vec![0.0, 1.0])])
            .await
            .unwrap();

        // A non-empty directory at the snapshot path makes the rename fail.
        let snapshot = dir.path().join("faq.json");
        std::fs::remove_file(&snapshot).unwrap();
        std::fs::create_dir(&snapshot).unwrap();
        std::fs::write(snapshot.join("blocker"), "x").unwrap();

        let result = store
            .upsert_batch("faq", &[IndexEntry::new("ghost", vec![1.0, 0.0])])
            .await;
        assert!(result.is_err());

        assert_eq!(store.len("faq").await, Some(1));
        let matches = store.query("faq", &[1.0, 0.0], 5).await.unwrap();
        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["kept"]);
    }

    #[tokio::test]
    async fn test_invalid_index_name_with_data_dir() {
        let dir = tempdir().unwrap();
        let store = MemoryVectorStore::with_data_dir(dir.path());
        let err = store
            .create_index(&IndexSpec::new("../faq", 2))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
