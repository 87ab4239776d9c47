//! Vector store abstraction.
//!
//! A `VectorStore` owns named indexes of `IndexEntry` values and answers
//! k-nearest-neighbor queries against them. Backends implement four
//! primitives (`describe_index`, `create_index`, `upsert_batch`, `query`);
//! the trait supplies the higher-level operations on top of them:
//!
//! - [`VectorStore::ensure_index`]: idempotent creation followed by a
//!   bounded readiness poll with exponential backoff
//! - [`VectorStore::upsert`]: dimension-checked writes split into batches and
//!   issued with bounded concurrency
//!
//! Write visibility is backend-defined. Hosted stores may not serve a freshly
//! upserted entry to the very next query.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::stream::{self, StreamExt};
use mediphant_core::{Error, Result};

use crate::types::{IndexDescription, IndexEntry, IndexSpec, Match, ReadinessPolicy, UpsertReport};

/// Default number of entries sent per `upsert_batch` call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Trait for vector storage backends.
///
/// The trait requires `Send + Sync` so a single store can be shared between
/// the indexer's workers and concurrent query pipelines.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Describe an index, or `None` if it does not exist.
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>>;

    /// Create an index. Called only when `describe_index` returned `None`.
    ///
    /// Creation may complete asynchronously; the index is usable once
    /// `describe_index` reports it ready.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Write a single batch of entries, overwriting by id.
    ///
    /// Returns the number of entries the store acknowledged. Entries have
    /// already been dimension-checked by the caller.
    async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize>;

    /// Return at most `k` matches, ordered by descending score.
    async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Largest batch `upsert_batch` accepts.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }

    /// Create the index if absent and wait until it is ready.
    ///
    /// An existing index is never altered. If its dimension, metric, or
    /// recorded embedding model disagrees with `spec`, this fails with a
    /// configuration error before anything is written.
    async fn ensure_index(
        &self,
        spec: &IndexSpec,
        policy: &ReadinessPolicy,
    ) -> Result<IndexDescription> {
        if spec.dimension == 0 {
            return Err(Error::config("index dimension must be positive"));
        }

        match self.describe_index(&spec.name).await? {
            Some(existing) => {
                check_compatible(&existing, spec)?;
                if existing.ready {
                    log::debug!("{}: index '{}' already exists", self.name(), spec.name);
                    return Ok(existing);
                }
                log::info!(
                    "{}: index '{}' exists but is not ready yet",
                    self.name(),
                    spec.name
                );
            }
            None => {
                log::info!(
                    "{}: creating index '{}' (dimension {}, metric {})",
                    self.name(),
                    spec.name,
                    spec.dimension,
                    spec.metric
                );
                self.create_index(spec).await?;
            }
        }

        let ready = wait_until_ready(self, &spec.name, policy).await?;
        check_compatible(&ready, spec)?;
        Ok(ready)
    }

    /// Write `entries` with at most `max_concurrency` batches in flight.
    ///
    /// Every entry's dimension is checked against the index before the first
    /// write. Failed batches are counted in the returned report rather than
    /// aborting the run; already-written batches are never rolled back.
    async fn upsert(
        &self,
        index: &str,
        entries: &[IndexEntry],
        max_concurrency: usize,
    ) -> Result<UpsertReport> {
        upsert_in_batches(self, index, entries, max_concurrency).await
    }
}

/// Dimension-check `entries`, then write them in `max_batch_size` batches
/// with at most `max_concurrency` in flight.
///
/// This is the body of [`VectorStore::upsert`], exposed so backends that
/// override `upsert` can still delegate to it.
pub async fn upsert_in_batches<S>(
    store: &S,
    index: &str,
    entries: &[IndexEntry],
    max_concurrency: usize,
) -> Result<UpsertReport>
where
    S: VectorStore + ?Sized,
{
    let description = store
        .describe_index(index)
        .await?
        .ok_or_else(|| Error::not_found(format!("index '{index}'")))?;
    check_entry_dimensions(&description, entries)?;

    let batch_size = store.max_batch_size().max(1);
    let concurrency = max_concurrency.max(1);
    let mut report = UpsertReport {
        attempted: entries.len(),
        ..Default::default()
    };

    let batches: Vec<_> = entries
        .chunks(batch_size)
        .enumerate()
        .map(|(i, batch)| async move { (i, batch.len(), store.upsert_batch(index, batch).await) })
        .collect();
    let mut results = stream::iter(batches).buffer_unordered(concurrency);

    while let Some((i, len, result)) = results.next().await {
        match result {
            Ok(written) => report.upserted += written.min(len),
            Err(e) => {
                log::warn!("{}: upsert batch {i} ({len} entries) failed: {e}", store.name());
                report.failed += len;
                report.errors.push(format!("upsert batch {i}: {e}"));
            }
        }
    }

    Ok(report)
}

/// Poll `describe_index` until the index is ready or `policy.timeout` elapses.
///
/// Delays grow exponentially from `policy.min_delay` to `policy.max_delay`.
/// Only "not ready" outcomes are retried; any other error ends the wait.
pub async fn wait_until_ready<S>(
    store: &S,
    name: &str,
    policy: &ReadinessPolicy,
) -> Result<IndexDescription>
where
    S: VectorStore + ?Sized,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.min_delay)
        .with_max_delay(policy.max_delay)
        .with_max_times(policy.max_attempts());

    let poll = || async move {
        match store.describe_index(name).await? {
            Some(description) if description.ready => Ok(description),
            Some(_) => Err(Error::not_ready(format!("index '{name}' is initializing"))),
            None => Err(Error::not_ready(format!("index '{name}' is not visible yet"))),
        }
    };

    let waited = poll
        .retry(backoff)
        .when(Error::is_not_ready)
        .notify(|err, delay| log::debug!("{err}; polling again in {delay:?}"));

    match tokio::time::timeout(policy.timeout, waited).await {
        Ok(Err(e)) if e.is_not_ready() => Err(Error::timeout(
            format!("waiting for index '{name}'"),
            policy.timeout,
        )),
        Ok(result) => result,
        Err(_) => Err(Error::timeout(
            format!("waiting for index '{name}'"),
            policy.timeout,
        )),
    }
}

/// Fail if an existing index cannot hold vectors described by `spec`.
pub fn check_compatible(existing: &IndexDescription, spec: &IndexSpec) -> Result<()> {
    if existing.dimension != spec.dimension {
        return Err(Error::config(format!(
            "index '{}' has dimension {}, but the embedding model produces {}",
            existing.name, existing.dimension, spec.dimension
        )));
    }
    if existing.metric != spec.metric {
        return Err(Error::config(format!(
            "index '{}' uses metric {}, configured metric is {}",
            existing.name, existing.metric, spec.metric
        )));
    }
    match (&existing.embedding_model, &spec.embedding_model) {
        (Some(recorded), Some(configured)) if recorded != configured => {
            Err(Error::config(format!(
                "index '{}' was built with embedding model '{recorded}', configured model is '{configured}'",
                existing.name
            )))
        }
        (None, Some(configured)) => {
            log::warn!(
                "index '{}' records no embedding model; assuming '{configured}'",
                existing.name
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_entry_dimensions(description: &IndexDescription, entries: &[IndexEntry]) -> Result<()> {
    if let Some(bad) = entries
        .iter()
        .find(|e| e.dimension() != description.dimension)
    {
        return Err(Error::config(format!(
            "entry {} has dimension {}, index '{}' expects {}",
            bad.id,
            bad.dimension(),
            description.name,
            description.dimension
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::memory::MemoryVectorStore;
    use crate::types::Metric;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Wraps the memory store, reporting new indexes as not ready for the
    /// first `polls_until_ready` describes and failing selected batches.
    struct SlowStore {
        inner: MemoryVectorStore,
        polls_until_ready: usize,
        polls: AtomicUsize,
        fail_batches_containing: Option<String>,
        created: Mutex<Vec<String>>,
        batch_size: usize,
    }

    impl SlowStore {
        fn new(polls_until_ready: usize) -> Self {
            Self {
                inner: MemoryVectorStore::new(),
                polls_until_ready,
                polls: AtomicUsize::new(0),
                fail_batches_containing: None,
                created: Mutex::new(Vec::new()),
                batch_size: DEFAULT_MAX_BATCH_SIZE,
            }
        }
    }

    #[async_trait]
    impl VectorStore for SlowStore {
        async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst);
            let mut description = self.inner.describe_index(name).await?;
            if let Some(d) = description.as_mut() {
                d.ready = polls >= self.polls_until_ready;
            }
            Ok(description)
        }

        async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
            self.created.lock().unwrap().push(spec.name.clone());
            self.inner.create_index(spec).await
        }

        async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
            if let Some(marker) = &self.fail_batches_containing
                && entries.iter().any(|e| e.text.contains(marker.as_str()))
            {
                return Err(Error::provider("slow", "503 Service Unavailable"));
            }
            self.inner.upsert_batch(index, entries).await
        }

        async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>> {
            self.inner.query(index, vector, k).await
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn max_batch_size(&self) -> usize {
            self.batch_size
        }
    }

    fn fast_policy() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_secs(5),
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_ensure_index_creates_and_waits() {
        let store = SlowStore::new(3);
        let spec = IndexSpec::new("faq", 4);

        let description = store.ensure_index(&spec, &fast_policy()).await.unwrap();
        assert!(description.ready);
        assert_eq!(description.dimension, 4);
        assert_eq!(store.created.lock().unwrap().as_slice(), ["faq"]);
        assert!(store.polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let store = SlowStore::new(0);
        let spec = IndexSpec::new("faq", 4);

        store.ensure_index(&spec, &fast_policy()).await.unwrap();
        store.ensure_index(&spec, &fast_policy()).await.unwrap();
        assert_eq!(store.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_index_dimension_mismatch_fails_fast() {
        let store = SlowStore::new(0);
        store
            .ensure_index(&IndexSpec::new("faq", 4), &fast_policy())
            .await
            .unwrap();

        let err = store
            .ensure_index(&IndexSpec::new("faq", 8), &fast_policy())
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("dimension 4"));
    }

    #[tokio::test]
    async fn test_ensure_index_metric_mismatch() {
        let store = SlowStore::new(0);
        store
            .ensure_index(&IndexSpec::new("faq", 4), &fast_policy())
            .await
            .unwrap();

        let spec = IndexSpec::new("faq", 4).with_metric(Metric::Euclidean);
        let err = store.ensure_index(&spec, &fast_policy()).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_ensure_index_embedding_model_mismatch() {
        let store = SlowStore::new(0);
        let spec = IndexSpec::new("faq", 4).with_embedding_model("model-a");
        store.ensure_index(&spec, &fast_policy()).await.unwrap();

        let other = IndexSpec::new("faq", 4).with_embedding_model("model-b");
        let err = store.ensure_index(&other, &fast_policy()).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("model-a"));
    }

    #[tokio::test]
    async fn test_ensure_index_rejects_zero_dimension() {
        let store = SlowStore::new(0);
        let err = store
            .ensure_index(&IndexSpec::new("faq", 0), &fast_policy())
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout() {
        let store = SlowStore::new(usize::MAX);
        let policy = ReadinessPolicy {
            timeout: Duration::from_secs(3),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
        };

        let err = store
            .ensure_index(&IndexSpec::new("faq", 4), &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_upsert_requires_index() {
        let store = SlowStore::new(0);
        let err = store
            .upsert("missing", &[IndexEntry::new("a", vec![1.0])], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension_before_writing() {
        let store = SlowStore::new(0);
        store
            .ensure_index(&IndexSpec::new("faq", 2), &fast_policy())
            .await
            .unwrap();

        let entries = vec![
            IndexEntry::new("good", vec![1.0, 0.0]),
            IndexEntry::new("bad", vec![1.0, 0.0, 0.0]),
        ];
        let err = store.upsert("faq", &entries, 5).await.unwrap_err();
        assert!(err.is_config());

        let matches = store.query("faq", &[1.0, 0.0], 5).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_reports_partial_failure() {
        let mut store = SlowStore::new(0);
        store.fail_batches_containing = Some("poison".to_string());
        store.batch_size = 2;
        store
            .ensure_index(&IndexSpec::new("faq", 2), &fast_policy())
            .await
            .unwrap();

        let entries = vec![
            IndexEntry::new("one", vec![1.0, 0.0]),
            IndexEntry::new("two", vec![0.0, 1.0]),
            IndexEntry::new("poison three", vec![1.0, 1.0]),
            IndexEntry::new("four", vec![0.5, 0.5]),
            IndexEntry::new("five", vec![0.2, 0.8]),
        ];
        let report = store.upsert("faq", &entries, 2).await.unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.upserted, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_complete());

        match report.into_result() {
            Err(Error::PartialIndexing {
                attempted,
                succeeded,
                failed,
            }) => assert_eq!((attempted, succeeded, failed), (5, 3, 2)),
            other => panic!("expected PartialIndexing, got {other:?}"),
        }

        // Written batches stay written.
        let matches = store.query("faq", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_zero_concurrency_still_writes() {
        let store = SlowStore::new(0);
        store
            .ensure_index(&IndexSpec::new("faq", 2), &fast_policy())
            .await
            .unwrap();
        let report = store
            .upsert("faq", &[IndexEntry::new("a", vec![1.0, 0.0])], 0)
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.upserted, 1);
    }

    #[test]
    fn test_check_compatible_untagged_index_is_accepted() {
        let existing = IndexDescription {
            name: "faq".into(),
            dimension: 4,
            metric: Metric::Cosine,
            ready: true,
            embedding_model: None,
            entry_count: None,
        };
        let spec = IndexSpec::new("faq", 4).with_embedding_model("gemini-embedding-001");
        assert!(check_compatible(&existing, &spec).is_ok());
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn VectorStore) {}
    }
}
