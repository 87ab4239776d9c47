//! Common types for chunking, indexing, and similarity search.
//!
//! These types are shared by every embedding provider and vector store and
//! are always available regardless of feature flags.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mediphant_core::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Chunks and entries
// ============================================================================

/// A contiguous paragraph of corpus text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Paragraph text, trimmed of surrounding whitespace. Never empty.
    pub text: String,

    /// Byte offset of the trimmed text within the corpus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_offset: Option<usize>,
}

impl Chunk {
    /// Create a chunk without offset information.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_offset: None,
        }
    }

    /// Set the byte offset within the corpus.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.source_offset = Some(offset);
        self
    }
}

/// A persisted (text, vector) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Store identifier. Derived from the text so re-indexing overwrites.
    pub id: String,

    /// Chunk text.
    pub text: String,

    /// Embedding vector.
    pub vector: Vec<f32>,

    /// Embedding model that produced `vector`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl IndexEntry {
    /// Create an entry whose id is the content hash of `text`.
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        let text = text.into();
        Self {
            id: content_id(&text),
            text,
            vector,
            embedding_model: None,
        }
    }

    /// Tag the entry with the embedding model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// The vector dimension.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Stable identifier for a chunk of text (first 32 hex chars of its blake3 hash).
pub fn content_id(text: &str) -> String {
    let hash = blake3::hash(text.as_bytes()).to_hex();
    hash.as_str()[..32].to_string()
}

/// A query-time result: chunk text and its similarity score.
///
/// Serializes as `{"text": ..., "score": ...}`, the shape the web and
/// mobile clients consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Chunk text.
    pub text: String,

    /// Similarity under the index metric. Higher is more relevant.
    pub score: f32,
}

impl Match {
    /// Create a match.
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

// ============================================================================
// Index definition
// ============================================================================

/// Similarity metric declared when an index is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity in [-1, 1].
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// Euclidean distance, reported as `1 / (1 + distance)`.
    Euclidean,
}

impl Metric {
    /// Wire name used in configuration and by hosted stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }

    /// Score `candidate` against `query`. Both slices have the same length.
    pub fn score(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let (mut dot, mut norm_q, mut norm_c) = (0.0f64, 0.0f64, 0.0f64);
                for (&q, &c) in query.iter().zip(candidate) {
                    let (q, c) = (f64::from(q), f64::from(c));
                    dot += q * c;
                    norm_q += q * q;
                    norm_c += c * c;
                }
                let denom = norm_q.sqrt() * norm_c.sqrt();
                if denom <= f64::EPSILON {
                    0.0
                } else {
                    (dot / denom) as f32
                }
            }
            Self::DotProduct => query.iter().zip(candidate).map(|(q, c)| q * c).sum(),
            Self::Euclidean => {
                let distance: f32 = query
                    .iter()
                    .zip(candidate)
                    .map(|(q, c)| (q - c) * (q - c))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dotproduct" | "dot_product" | "dot" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(Error::config(format!(
                "Unknown similarity metric: '{other}'. Supported: cosine, dotproduct, euclidean"
            ))),
        }
    }
}

/// Everything needed to create a named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, one per deployment.
    pub name: String,

    /// Vector dimension. Must equal the embedding model's output dimension.
    pub dimension: usize,

    /// Similarity metric.
    #[serde(default)]
    pub metric: Metric,

    /// Cloud provider hint for hosted stores (e.g. "aws").
    #[serde(default = "default_cloud")]
    pub cloud: String,

    /// Region hint for hosted stores (e.g. "us-east-1").
    #[serde(default = "default_region")]
    pub region: String,

    /// Embedding model the index is built for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl IndexSpec {
    /// Create a cosine index spec with default cloud hints.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: Metric::default(),
            cloud: default_cloud(),
            region: default_region(),
            embedding_model: None,
        }
    }

    /// Set the similarity metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the cloud and region hints.
    pub fn with_location(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    /// Record the embedding model the index is built for.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }
}

/// What a store reports about an existing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,

    /// Declared vector dimension.
    pub dimension: usize,

    /// Declared metric.
    pub metric: Metric,

    /// Whether the index accepts reads and writes.
    pub ready: bool,

    /// Embedding model recorded at creation, if the store keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Number of stored entries, when cheaply known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<usize>,
}

// ============================================================================
// Reports
// ============================================================================

/// How long and how often to poll a freshly created index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Give up after this long.
    pub timeout: Duration,
    /// First delay between polls.
    pub min_delay: Duration,
    /// Upper bound on the delay between polls.
    pub max_delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReadinessPolicy {
    /// Policy with the given overall timeout and default delays.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Upper bound on the number of polls that fit in the timeout.
    pub fn max_attempts(&self) -> usize {
        let min = self.min_delay.as_millis().max(1);
        (self.timeout.as_millis() / min).max(1) as usize
    }
}

/// Outcome of a bounded-concurrency upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Entries submitted.
    pub attempted: usize,
    /// Entries the store acknowledged.
    pub upserted: usize,
    /// Entries in batches that failed.
    pub failed: usize,
    /// One message per failed batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl UpsertReport {
    /// True when every entry was written.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Convert a report with failures into a `PartialIndexing` error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PartialIndexing {
                attempted: self.attempted,
                succeeded: self.upserted,
                failed: self.failed,
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
