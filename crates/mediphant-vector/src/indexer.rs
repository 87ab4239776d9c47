//! Full-corpus indexing.
//!
//! [`Indexer::run`] loads the corpus, splits it into paragraphs and embeds
//! the paragraphs in batches, keeping at most `concurrency` batches in
//! flight. The resulting entries are written with [`VectorStore::upsert`]
//! under the same bound. Entry ids are content hashes, so running the
//! indexer again over the same corpus overwrites rather than duplicates,
//! and repeated paragraphs collapse into a single entry.
//!
//! A run in which any batch fails is reported as [`IndexStatus::Partial`]
//! with separate embedded and upserted counts. Batches that were written are
//! not rolled back.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use mediphant_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::chunker::chunk_paragraphs;
use crate::embedding::{EmbeddingProvider, check_dimension};
use crate::store::VectorStore;
use crate::types::{Chunk, IndexEntry, IndexSpec, Metric, ReadinessPolicy};

/// Default number of batches embedded and upserted at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default number of chunks per embedding batch.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Where the corpus comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    /// A UTF-8 text file.
    Path(PathBuf),
    /// Corpus text held in memory.
    Text(String),
}

impl CorpusSource {
    /// Read the corpus text.
    pub async fn load(&self) -> Result<String> {
        match self {
            Self::Path(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::io_with_path(e, path)),
            Self::Text(text) => Ok(text.clone()),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Text(text) => format!("<inline corpus, {} bytes>", text.len()),
        }
    }
}

/// Settings for one indexing run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Target index name.
    pub index_name: String,
    /// Expected embedding dimension; must match the provider.
    pub dimension: usize,
    /// Similarity metric for a newly created index.
    pub metric: Metric,
    /// Cloud hint for hosted stores.
    pub cloud: String,
    /// Region hint for hosted stores.
    pub region: String,
    /// Maximum batches in flight.
    pub concurrency: usize,
    /// Chunks per embedding batch.
    pub batch_size: usize,
    /// How long to wait for a newly created index.
    pub readiness: ReadinessPolicy,
}

impl IndexerConfig {
    /// Config with default concurrency, batch size, and location hints.
    pub fn new(index_name: impl Into<String>, dimension: usize) -> Self {
        let spec = IndexSpec::new(index_name, dimension);
        Self {
            index_name: spec.name,
            dimension,
            metric: spec.metric,
            cloud: spec.cloud,
            region: spec.region,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            readiness: ReadinessPolicy::default(),
        }
    }

    /// Set the maximum number of batches in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the number of chunks per embedding batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the similarity metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set cloud and region hints.
    pub fn with_location(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    /// Set the readiness policy.
    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Index definition for vectors produced by `embedding_model`.
    pub fn index_spec(&self, embedding_model: &str) -> IndexSpec {
        IndexSpec::new(&self.index_name, self.dimension)
            .with_metric(self.metric)
            .with_location(&self.cloud, &self.region)
            .with_embedding_model(embedding_model)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// Every chunk was embedded and upserted.
    Complete,
    /// The corpus held no paragraphs; nothing was written.
    Empty,
    /// At least one batch failed.
    Partial,
}

/// Counts and errors from an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Target index.
    pub index_name: String,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks successfully embedded.
    pub embedded: usize,
    /// Embedded chunks whose text repeated an earlier chunk and so shared
    /// its entry id.
    #[serde(default)]
    pub duplicates: usize,
    /// Entries the store acknowledged.
    pub upserted: usize,
    /// Chunks that failed to embed or upsert.
    pub failed: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// One message per failed batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Overall status.
    pub status: IndexStatus,
}

impl IndexReport {
    /// Turn a partial run into a `PartialIndexing` error.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            IndexStatus::Partial => Err(Error::PartialIndexing {
                attempted: self.chunks,
                succeeded: self.upserted,
                failed: self.failed,
            }),
            IndexStatus::Complete | IndexStatus::Empty => Ok(self),
        }
    }
}

/// Entries produced from one embedding batch, or why it failed.
struct EmbeddedBatch {
    index: usize,
    size: usize,
    entries: Result<Vec<IndexEntry>>,
}

/// Builds the vector index from a corpus.
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: IndexerConfig,
}

impl Indexer {
    /// Create an indexer.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// The run configuration.
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index every paragraph of `source`.
    ///
    /// Fails outright on configuration problems (dimension or model
    /// mismatches) and when the corpus cannot be read. The corpus is read
    /// before the store is touched. Provider failures on individual batches
    /// are recorded in the report instead.
    pub async fn run(&self, source: &CorpusSource) -> Result<IndexReport> {
        let started = Instant::now();

        if self.provider.dimension() != self.config.dimension {
            return Err(Error::config(format!(
                "{} model '{}' produces {}-dimensional vectors, index '{}' is configured for {}",
                self.provider.name(),
                self.provider.model_id(),
                self.provider.dimension(),
                self.config.index_name,
                self.config.dimension
            )));
        }

        let corpus = source.load().await?;
        let chunks = chunk_paragraphs(&corpus);

        let spec = self.config.index_spec(self.provider.model_id());
        self.store.ensure_index(&spec, &self.config.readiness).await?;

        log::info!(
            "Indexing {} paragraphs from {} into '{}' ({} / {})",
            chunks.len(),
            source.describe(),
            self.config.index_name,
            self.provider.name(),
            self.store.name()
        );

        let mut report = IndexReport {
            index_name: self.config.index_name.clone(),
            chunks: chunks.len(),
            embedded: 0,
            duplicates: 0,
            upserted: 0,
            failed: 0,
            duration_ms: 0,
            errors: Vec::new(),
            status: IndexStatus::Complete,
        };

        if chunks.is_empty() {
            log::warn!("Corpus {} contains no paragraphs", source.describe());
            report.status = IndexStatus::Empty;
            report.duration_ms = elapsed_ms(started);
            return Ok(report);
        }

        let entries = self.embed_all(&chunks, &mut report).await?;
        let entries = dedup_entries(entries, &mut report);

        let written = self
            .store
            .upsert(&self.config.index_name, &entries, self.config.concurrency)
            .await?;
        report.upserted = written.upserted.min(entries.len());
        report.failed += written.failed;
        report.errors.extend(written.errors);

        if report.failed > 0 {
            report.status = IndexStatus::Partial;
        }
        report.duration_ms = elapsed_ms(started);
        log::info!(
            "Indexed '{}': {} chunks, {} embedded, {} duplicates, {} upserted, {} failed in {}ms",
            report.index_name,
            report.chunks,
            report.embedded,
            report.duplicates,
            report.upserted,
            report.failed,
            report.duration_ms
        );
        Ok(report)
    }

    /// Embed `chunks` in batches with bounded concurrency.
    ///
    /// Failed batches are counted in `report`; configuration errors abort.
    async fn embed_all(
        &self,
        chunks: &[Chunk],
        report: &mut IndexReport,
    ) -> Result<Vec<IndexEntry>> {
        let batch_size = self
            .config
            .batch_size
            .clamp(1, self.store.max_batch_size().max(1));
        let concurrency = self.config.concurrency.max(1);

        let mut batches = stream::iter(chunks.chunks(batch_size).enumerate())
            .map(|(index, batch)| async move {
                EmbeddedBatch {
                    index,
                    size: batch.len(),
                    entries: self.embed_batch(batch).await,
                }
            })
            .buffer_unordered(concurrency);

        let mut embedded = Vec::with_capacity(chunks.len());
        while let Some(batch) = batches.next().await {
            match batch.entries {
                Ok(entries) => embedded.push((batch.index, entries)),
                Err(err) if err.is_config() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "Embedding batch {} ({} chunks) failed: {err}",
                        batch.index,
                        batch.size
                    );
                    report.failed += batch.size;
                    report.errors.push(format!("embedding batch {}: {err}", batch.index));
                }
            }
        }

        // Corpus order, so the first of two identical paragraphs wins.
        embedded.sort_by_key(|(index, _)| *index);
        let entries: Vec<IndexEntry> = embedded.into_iter().flat_map(|(_, e)| e).collect();
        report.embedded = entries.len();
        Ok(entries)
    }

    async fn embed_batch(&self, batch: &[Chunk]) -> Result<Vec<IndexEntry>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.provider.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::provider(
                self.provider.name(),
                format!(
                    "returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ),
            ));
        }
        for vector in &vectors {
            check_dimension(self.provider.name(), vector, self.config.dimension)?;
        }

        let model = self.provider.model_id();
        Ok(batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(chunk.text.as_str(), vector).with_model(model))
            .collect())
    }
}

/// Keep the first entry for each id, counting the rest in `report`.
fn dedup_entries(entries: Vec<IndexEntry>, report: &mut IndexReport) -> Vec<IndexEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    let unique: Vec<IndexEntry> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect();
    report.duplicates = report.embedded - unique.len();
    if report.duplicates > 0 {
        log::info!(
            "{} repeated paragraphs collapsed into existing entries of '{}'",
            report.duplicates,
            report.index_name
        );
    }
    unique
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::memory::MemoryVectorStore;
    use crate::store::upsert_in_batches;
    use crate::types::{IndexDescription, Match, UpsertReport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DIM: usize = 64;

    fn indexer_with(store: Arc<dyn VectorStore>, config: IndexerConfig) -> Indexer {
        Indexer::new(Arc::new(MockEmbeddingProvider::new(DIM)), store, config)
    }

    /// Memory store that writes one entry per batch, fails batches
    /// containing a marker, and tracks how many batches are in flight and
    /// how many `upsert` calls it served.
    struct FlakyStore {
        inner: MemoryVectorStore,
        poison: Option<&'static str>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        upsert_calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(poison: Option<&'static str>) -> Self {
            Self {
                inner: MemoryVectorStore::new(),
                poison,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                upsert_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
            self.inner.describe_index(name).await
        }

        async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
            self.inner.create_index(spec).await
        }

        async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = self.poison
                && entries.iter().any(|e| e.text.contains(marker))
            {
                return Err(Error::provider("flaky", "quota exceeded"));
            }
            self.inner.upsert_batch(index, entries).await
        }

        async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>> {
            self.inner.query(index, vector, k).await
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn max_batch_size(&self) -> usize {
            1
        }

        async fn upsert(
            &self,
            index: &str,
            entries: &[IndexEntry],
            max_concurrency: usize,
        ) -> Result<UpsertReport> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            upsert_in_batches(self, index, entries, max_concurrency).await
        }
    }

    #[tokio::test]
    async fn test_run_indexes_every_paragraph() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));
        let corpus = "Take your medication every morning.\n\nWarfarin interacts with many foods.";

        let report = indexer
            .run(&CorpusSource::Text(corpus.to_string()))
            .await
            .unwrap();

        assert_eq!(report.status, IndexStatus::Complete);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.len("faq").await, Some(2));

        let description = store.describe_index("faq").await.unwrap().unwrap();
        assert_eq!(description.embedding_model.as_deref(), Some("mock-bow"));
    }

    #[tokio::test]
    async fn test_writes_go_through_store_upsert() {
        let store = Arc::new(FlakyStore::new(None));
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));

        let report = indexer
            .run(&CorpusSource::Text("One.\n\nTwo.\n\nThree.".to_string()))
            .await
            .unwrap();
        assert_eq!(report.upserted, 3);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_paragraphs_are_counted_as_duplicates() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));
        let corpus = "Take with food.\n\nStore below 25C.\n\nTake with food.";

        let report = indexer
            .run(&CorpusSource::Text(corpus.to_string()))
            .await
            .unwrap();
        assert_eq!(report.status, IndexStatus::Complete);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.embedded, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.upserted, 2);

        let description = store.describe_index("faq").await.unwrap().unwrap();
        assert_eq!(description.entry_count, Some(report.upserted));
    }

    #[tokio::test]
    async fn test_rerun_overwrites() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));
        let source = CorpusSource::Text("One.\n\nTwo.\n\nThree.".to_string());

        indexer.run(&source).await.unwrap();
        indexer.run(&source).await.unwrap();
        assert_eq!(store.len("faq").await, Some(3));
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));

        let report = indexer
            .run(&CorpusSource::Text(" \n\n \t ".to_string()))
            .await
            .unwrap();
        assert_eq!(report.status, IndexStatus::Empty);
        assert_eq!(report.chunks, 0);
        assert!(report.into_result().is_ok());
        assert_eq!(store.len("faq").await, Some(0));
    }

    #[tokio::test]
    async fn test_provider_dimension_mismatch_fails_before_index_creation() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", 3072));

        let err = indexer
            .run(&CorpusSource::Text("Paragraph.".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(store.describe_index("faq").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_index_dimension_mismatch() {
        let store = Arc::new(MemoryVectorStore::new());
        store.create_index(&IndexSpec::new("faq", 32)).await.unwrap();
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));

        let err = indexer
            .run(&CorpusSource::Text("Paragraph.".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(store.len("faq").await, Some(0));
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let store = Arc::new(FlakyStore::new(Some("poison")));
        let config = IndexerConfig::new("faq", DIM).with_batch_size(1);
        let indexer = indexer_with(store.clone(), config);
        let corpus = "Good one.\n\nA poison paragraph.\n\nGood two.\n\nGood three.";

        let report = indexer
            .run(&CorpusSource::Text(corpus.to_string()))
            .await
            .unwrap();
        assert_eq!(report.status, IndexStatus::Partial);
        assert_eq!(report.chunks, 4);
        assert_eq!(report.embedded, 4);
        assert_eq!(report.upserted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);

        match report.into_result() {
            Err(Error::PartialIndexing {
                attempted,
                succeeded,
                failed,
            }) => assert_eq!((attempted, succeeded, failed), (4, 3, 1)),
            other => panic!("expected PartialIndexing, got {other:?}"),
        }
        // Written chunks are kept.
        assert_eq!(store.inner.len("faq").await, Some(3));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(FlakyStore::new(None));
        let config = IndexerConfig::new("faq", DIM)
            .with_batch_size(1)
            .with_concurrency(2);
        let indexer = indexer_with(store.clone(), config);
        let corpus: Vec<String> = (0..10).map(|i| format!("Paragraph {i}.")).collect();

        let report = indexer
            .run(&CorpusSource::Text(corpus.join("\n\n")))
            .await
            .unwrap();
        assert_eq!(report.upserted, 10);
        let max = store.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "saw {max} batches in flight");
    }

    #[tokio::test]
    async fn test_corpus_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.md");
        std::fs::write(&path, "First.\n\nSecond.\n").unwrap();

        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));
        let report = indexer.run(&CorpusSource::Path(path)).await.unwrap();
        assert_eq!(report.upserted, 2);
    }

    #[tokio::test]
    async fn test_unreadable_corpus_leaves_store_untouched() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = indexer_with(store.clone(), IndexerConfig::new("faq", DIM));

        let source = CorpusSource::Path(PathBuf::from("/nonexistent/corpus.md"));
        let err = indexer.run(&source).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(store.describe_index("faq").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_corpus_file() {
        let source = CorpusSource::Path(PathBuf::from("/nonexistent/corpus.md"));
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/corpus.md"));
    }

    #[test]
    fn test_config_index_spec() {
        let config = IndexerConfig::new("faq", 3072)
            .with_location("gcp", "europe-west4")
            .with_metric(Metric::DotProduct);
        let spec = config.index_spec("gemini-embedding-001");
        assert_eq!(spec.name, "faq");
        assert_eq!(spec.dimension, 3072);
        assert_eq!(spec.metric, Metric::DotProduct);
        assert_eq!(spec.region, "europe-west4");
        assert_eq!(spec.embedding_model.as_deref(), Some("gemini-embedding-001"));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }
}
