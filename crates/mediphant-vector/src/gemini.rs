//! Gemini embedding provider.
//!
//! Talks to the Google Generative Language API (`embedContent` and
//! `batchEmbedContents`). Every returned vector is checked against the
//! configured output dimension; a mismatch is a configuration error.

use std::time::Duration;

use async_trait::async_trait;
use mediphant_core::{Error, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingProvider, check_dimension, ensure_embeddable};

/// Default Generative Language API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// Output dimension of `gemini-embedding-001`.
pub const DEFAULT_GEMINI_DIMENSION: usize = 3072;

/// Gemini's cap on requests per `batchEmbedContents` call.
const MAX_BATCH: usize = 100;

/// Embedding provider backed by the Gemini API.
#[derive(Clone)]
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl GeminiEmbeddingProvider {
    /// Build a new Gemini embeddings client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Value for the `x-goog-api-key` header (usually `GEMINI_API_KEY`)
    /// * `model` - Model identifier (e.g. `gemini-embedding-001`)
    /// * `dimension` - Requested output dimensionality
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("missing Gemini API key"));
        }
        if model.trim().is_empty() {
            return Err(Error::config("missing Gemini embedding model name"));
        }
        if dimension == 0 {
            return Err(Error::config("embedding dimension must be positive"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|e| Error::config(format!("invalid Gemini API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to build Gemini HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model,
            dimension,
            batch_size: MAX_BATCH,
        })
    }

    /// Point the client at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Limit the number of texts sent per batch call (capped at 100).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH);
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, self.model)
    }

    fn content_request<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
            output_dimensionality: self.dimension,
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::provider("gemini", format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::provider(
                "gemini",
                format!("{method} returned {status}: {text}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::provider("gemini", format!("failed to parse {method} response: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;
        let response: EmbedContentResponse =
            self.post("embedContent", &self.content_request(text)).await?;
        let values = response.embedding.values;
        check_dimension("gemini", &values, self.dimension)?;
        Ok(values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_embeddable(text)?;
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let request = BatchEmbedRequest {
                requests: batch.iter().map(|t| self.content_request(t)).collect(),
            };
            let response: BatchEmbedResponse = self.post("batchEmbedContents", &request).await?;
            vectors.extend(response.into_vectors(batch.len())?);
        }

        for vector in &vectors {
            check_dimension("gemini", vector, self.dimension)?;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

impl std::fmt::Debug for GeminiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbeddingProvider")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl BatchEmbedResponse {
    fn into_vectors(self, expected_len: usize) -> Result<Vec<Vec<f32>>> {
        if self.embeddings.len() != expected_len {
            return Err(Error::provider(
                "gemini",
                format!(
                    "returned {} embeddings for {expected_len} inputs",
                    self.embeddings.len()
                ),
            ));
        }
        Ok(self.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

// ============================================================================
// Tests
// ============================================================================
