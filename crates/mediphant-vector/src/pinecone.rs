//! Pinecone vector store.
//!
//! Uses the Pinecone REST API: the control plane (`api.pinecone.io`) to
//! describe and create serverless indexes, and each index's own data-plane
//! host for upserts and queries. Index hosts are looked up once and cached.
//!
//! Chunk text and the embedding model are stored as vector metadata
//! (`text`, `embedding_model`); the model is also recorded as an index tag.
//! Pinecone is eventually consistent: an upserted vector may not be returned
//! by a query issued immediately afterwards.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mediphant_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::VectorStore;
use crate::types::{IndexDescription, IndexEntry, IndexSpec, Match, Metric};

/// Default control-plane URL.
pub const DEFAULT_PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";

/// API version sent with every request.
pub const PINECONE_API_VERSION: &str = "2025-01";

/// Pinecone recommends at most 100 vectors per upsert; large vectors need fewer.
const PINECONE_MAX_BATCH: usize = 50;

/// Vector store backed by a Pinecone project.
pub struct PineconeVectorStore {
    client: reqwest::Client,
    control_url: String,
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeVectorStore {
    /// Create a client for the project owning `api_key`.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::config("missing Pinecone API key"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|e| Error::config(format!("invalid Pinecone API key: {e}")))?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_static(PINECONE_API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to build Pinecone HTTP client: {e}")))?;

        Ok(Self {
            client,
            control_url: DEFAULT_PINECONE_CONTROL_URL.to_string(),
            hosts: RwLock::default(),
        })
    }

    /// Use a different control-plane URL (local emulator, tests).
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Pin the data-plane host for `index`, skipping the describe lookup.
    pub async fn set_host(&self, index: &str, host: impl Into<String>) {
        self.hosts
            .write()
            .await
            .insert(index.to_string(), host.into());
    }

    async fn host(&self, index: &str) -> Result<String> {
        if let Some(host) = self.hosts.read().await.get(index) {
            return Ok(host.clone());
        }
        let model = self
            .fetch_index(index)
            .await?
            .ok_or_else(|| Error::not_found(format!("index '{index}'")))?;
        if model.host.is_empty() {
            return Err(Error::not_ready(format!("index '{index}' has no host yet")));
        }
        let host = data_plane_url(&model.host);
        self.set_host(index, host.clone()).await;
        Ok(host)
    }

    async fn fetch_index(&self, name: &str) -> Result<Option<IndexModel>> {
        let response = self
            .client
            .get(format!("{}/indexes/{name}", self.control_url))
            .send()
            .await
            .map_err(|e| pinecone_error(format!("describe index request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let model: IndexModel = read_json(response, "describe index").await?;
        Ok(Some(model))
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let Some(model) = self.fetch_index(name).await? else {
            return Ok(None);
        };
        if model.status.ready && !model.host.is_empty() {
            self.set_host(name, data_plane_url(&model.host)).await;
        }
        Ok(Some(model.into_description()))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let body = CreateIndexRequest::from_spec(spec);
        let response = self
            .client
            .post(format!("{}/indexes", self.control_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| pinecone_error(format!("create index request failed: {e}")))?;

        // Another process created it first.
        if response.status() == StatusCode::CONFLICT {
            log::info!("pinecone: index '{}' already exists", spec.name);
            return Ok(());
        }
        let _: serde_json::Value = read_json(response, "create index").await?;
        Ok(())
    }

    async fn upsert_batch(&self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let host = self.host(index).await?;
        let body = UpsertRequest {
            vectors: entries.iter().map(PineconeVector::from_entry).collect(),
        };
        let response = self
            .client
            .post(format!("{host}/vectors/upsert"))
            .json(&body)
            .send()
            .await
            .map_err(|e| pinecone_error(format!("upsert request failed: {e}")))?;
        let parsed: UpsertResponse = read_json(response, "upsert").await?;
        Ok(parsed.upserted_count)
    }

    async fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let host = self.host(index).await?;
        let body = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
        };
        let response = self
            .client
            .post(format!("{host}/query"))
            .json(&body)
            .send()
            .await
            .map_err(|e| pinecone_error(format!("query request failed: {e}")))?;
        let parsed: QueryResponse = read_json(response, "query").await?;
        Ok(parsed.into_matches(k))
    }

    fn name(&self) -> &str {
        "pinecone"
    }

    fn max_batch_size(&self) -> usize {
        PINECONE_MAX_BATCH
    }
}

impl std::fmt::Debug for PineconeVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeVectorStore")
            .field("control_url", &self.control_url)
            .finish()
    }
}

fn pinecone_error(message: String) -> Error {
    Error::provider("pinecone", message)
}

fn data_plane_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(pinecone_error(format!("{operation} returned {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| pinecone_error(format!("failed to parse {operation} response: {e}")))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    #[serde(default)]
    metric: Metric,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl IndexModel {
    fn into_description(self) -> IndexDescription {
        IndexDescription {
            name: self.name,
            dimension: self.dimension,
            metric: self.metric,
            ready: self.status.ready,
            embedding_model: self.tags.and_then(|mut t| t.remove("embedding_model")),
            entry_count: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest {
    name: String,
    dimension: usize,
    metric: Metric,
    spec: ServerlessSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<HashMap<String, String>>,
}

impl CreateIndexRequest {
    fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name.clone(),
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: spec.cloud.clone(),
                    region: spec.region.clone(),
                },
            },
            tags: spec
                .embedding_model
                .as_ref()
                .map(|m| HashMap::from([("embedding_model".to_string(), m.clone())])),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServerlessSpec {
    serverless: CloudRegion,
}

#[derive(Debug, Serialize)]
struct CloudRegion {
    cloud: String,
    region: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: VectorMetadata<'a>,
}

impl<'a> PineconeVector<'a> {
    fn from_entry(entry: &'a IndexEntry) -> Self {
        Self {
            id: &entry.id,
            values: &entry.vector,
            metadata: VectorMetadata {
                text: &entry.text,
                embedding_model: entry.embedding_model.as_deref(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct VectorMetadata<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

impl QueryResponse {
    fn into_matches(self, k: usize) -> Vec<Match> {
        let mut matches: Vec<Match> = self
            .matches
            .into_iter()
            .filter_map(|m| match m.metadata.and_then(|md| md.text) {
                Some(text) => Some(Match::new(text, m.score)),
                None => {
                    log::warn!("pinecone: match {} has no text metadata, skipping", m.id);
                    None
                }
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        matches
    }
}

#[derive(Debug, Deserialize)]
struct ScoredVector {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Debug, Deserialize)]
struct MatchMetadata {
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
