//! LanceDB vector store.
//!
//! Each index is a LanceDB table in a local database directory. Tables are
//! usable immediately after creation.
//!
//! # Schema
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | Utf8 | Content-hash entry identifier |
//! | `text` | Utf8 | Chunk text |
//! | `embedding_model` | Utf8 (nullable) | Model that produced the vector |
//! | `vector` | FixedSizeList<Float32> | Embedding vector |
//!
//! The index metric and embedding model are kept in the Arrow schema
//! metadata under `metric` and `embedding_model`.
//!
//! This module requires the `vector-lancedb` feature.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use mediphant_core::{Error, Result};

use crate::store::VectorStore;
use crate::types::{IndexDescription, IndexEntry, IndexSpec, Match, Metric};

const METRIC_KEY: &str = "metric";
const MODEL_KEY: &str = "embedding_model";

/// Vector store backed by a local LanceDB database.
pub struct LancedbVectorStore {
    connection: lancedb::Connection,
    uri: String,
}

impl LancedbVectorStore {
    /// Open (or create) the database at `uri`.
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| lance_error(format!("failed to connect to {uri}: {e}")))?;
        Ok(Self {
            connection,
            uri: uri.to_string(),
        })
    }

    async fn open(&self, index: &str) -> Result<Option<lancedb::Table>> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| lance_error(format!("failed to list tables: {e}")))?;
        if !names.iter().any(|n| n == index) {
            return Ok(None);
        }
        let table = self
            .connection
            .open_table(index)
            .execute()
            .await
            .map_err(|e| lance_error(format!("failed to open table '{index}': {e}")))?;
        Ok(Some(table))
    }

    async fn open_existing(&self, index: &str) -> Result<lancedb::Table> {
        self.open(index)
            .await?
            .ok_or_else(|| Error::not_found(format!("index '{index}'")))
    }
}

#[async_trait]
impl VectorStore for LancedbVectorStore {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let Some(table) = self.open(name).await? else {
            return Ok(None);
        };
        let schema = table
            .schema()
            .await
            .map_err(|e| lance_error(format!("failed to read schema of '{name}': {e}")))?;
        let entry_count = table
            .count_rows(None)
            .await
            .map_err(|e| lance_error(format!("failed to count rows of '{name}': {e}")))?;

        let metric = match schema.metadata().get(METRIC_KEY) {
            Some(m) => m.parse()?,
            None => Metric::default(),
        };
        Ok(Some(IndexDescription {
            name: name.to_string(),
            dimension: vector_dimension(&schema)?,
            metric,
            ready: true,
            embedding_model: schema.metadata().get(MODEL_KEY).cloned(),
            entry_count: Some(entry_count),
        }))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let dimension = i32::try_from(spec.dimension)
            .map_err(|_| Error::config(format!("dimension {} is too large", spec.dimension)))?;
        let schema = make_schema(dimension, spec.metric, spec.embedding_model.as_deref());
        self.connection
            .create_empty_table(&spec.name, schema)
            .execute()
            .await
            .map_err(|e| lance_error(format!("failed to create table '{}': {e}", spec.name)))?;
        Ok(())
    }

    async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let table = self.open_existing(index).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| lance_error(format!("failed to read schema of '{index}': {e}")))?;
        let dimension = vector_dimension(&schema)?;
        let batch = build_record_batch(entries, schema, dimension)?;

        // One merge keyed on id, so a failed write leaves existing rows intact.
        let reader_schema = batch.schema();
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(RecordBatchIterator::new(vec![Ok(batch)], reader_schema)))
            .await
            .map_err(|e| lance_error(format!("failed to upsert entries into '{index}': {e}")))?;
        Ok(entries.len())
    }

    async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        let description = self
            .describe_index(index)
            .await?
            .ok_or_else(|| Error::not_found(format!("index '{index}'")))?;
        if vector.len() != description.dimension {
            return Err(Error::config(format!(
                "query vector has dimension {}, index '{index}' expects {}",
                vector.len(),
                description.dimension
            )));
        }
        if k == 0 || description.entry_count == Some(0) {
            return Ok(Vec::new());
        }

        let table = self.open_existing(index).await?;
        let results = table
            .vector_search(vector.to_vec())
            .map_err(|e| lance_error(format!("failed to build vector search: {e}")))?
            .distance_type(distance_type(description.metric))
            .limit(k)
            .execute()
            .await
            .map_err(|e| lance_error(format!("vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| lance_error(format!("failed to collect results: {e}")))?;

        let mut matches = Vec::new();
        for batch in &batches {
            matches.extend(parse_matches(batch, description.metric)?);
        }
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

impl std::fmt::Debug for LancedbVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LancedbVectorStore")
            .field("uri", &self.uri)
            .finish()
    }
}

fn lance_error(message: String) -> Error {
    Error::provider("lancedb", message)
}

fn distance_type(metric: Metric) -> DistanceType {
    match metric {
        Metric::Cosine => DistanceType::Cosine,
        Metric::DotProduct => DistanceType::Dot,
        Metric::Euclidean => DistanceType::L2,
    }
}

/// Convert a LanceDB distance into a higher-is-better score.
fn distance_to_score(metric: Metric, distance: f32) -> f32 {
    match metric {
        Metric::Cosine | Metric::DotProduct => 1.0 - distance,
        Metric::Euclidean => 1.0 / (1.0 + distance.max(0.0).sqrt()),
    }
}

// ============================================================================
// Arrow schema and batch construction
// ============================================================================

fn make_schema(dimension: i32, metric: Metric, embedding_model: Option<&str>) -> Arc<Schema> {
    let mut metadata = HashMap::new();
    metadata.insert(METRIC_KEY.to_string(), metric.as_str().to_string());
    if let Some(model) = embedding_model {
        metadata.insert(MODEL_KEY.to_string(), model.to_string());
    }

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("embedding_model", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ],
        metadata,
    ))
}

fn vector_dimension(schema: &Schema) -> Result<usize> {
    let field = schema
        .field_with_name("vector")
        .map_err(|_| lance_error("table has no 'vector' column".to_string()))?;
    match field.data_type() {
        DataType::FixedSizeList(_, size) => Ok(usize::try_from(*size).unwrap_or_default()),
        other => Err(lance_error(format!(
            "'vector' column has unexpected type {other:?}"
        ))),
    }
}

fn build_record_batch(
    entries: &[IndexEntry],
    schema: Arc<Schema>,
    dimension: usize,
) -> Result<RecordBatch> {
    if let Some(bad) = entries.iter().find(|e| e.dimension() != dimension) {
        return Err(Error::config(format!(
            "entry {} has dimension {}, expected {dimension}",
            bad.id,
            bad.dimension()
        )));
    }
    let size = i32::try_from(dimension)
        .map_err(|_| Error::config(format!("dimension {dimension} is too large")))?;

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    let models: Vec<Option<&str>> = entries
        .iter()
        .map(|e| e.embedding_model.as_deref())
        .collect();
    let values: Vec<f32> = entries
        .iter()
        .flat_map(|e| e.vector.iter().copied())
        .collect();

    let vectors = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        size,
        Arc::new(Float32Array::from(values)),
        None,
    )
    .map_err(|e| lance_error(format!("failed to build vector array: {e}")))?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(models)),
            Arc::new(vectors),
        ],
    )
    .map_err(|e| lance_error(format!("failed to build record batch: {e}")))
}

fn parse_matches(batch: &RecordBatch, metric: Metric) -> Result<Vec<Match>> {
    let texts = batch
        .column_by_name("text")
        .ok_or_else(|| lance_error("missing 'text' column in results".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| lance_error("'text' column is not a string array".to_string()))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|i| {
            let distance = distances.map(|c| c.value(i)).unwrap_or(0.0);
            Match::new(texts.value(i), distance_to_score(metric, distance))
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
