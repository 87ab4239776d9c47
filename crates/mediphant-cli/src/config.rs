//! Configuration for the `mediphant` binary.
//!
//! [`MediphantConfig`] loads from a TOML file, `MEDIPHANT_*` environment
//! variables, and built-in defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `MEDIPHANT_CONFIG` environment variable
//! 3. XDG default: `~/.config/mediphant/config.toml`
//! 4. Built-in defaults
//!
//! API keys left empty in the file fall back to `GEMINI_API_KEY`,
//! `PINECONE_API_KEY`, and `ANTHROPIC_API_KEY`.

use std::path::PathBuf;
use std::time::Duration;

use confyg::{Confygery, env};
use mediphant_core::{Error, Result};
use mediphant_rag::{DEFAULT_MAX_TOKENS, DEFAULT_TOP_K};
use mediphant_vector::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_GEMINI_DIMENSION,
    DEFAULT_GEMINI_EMBEDDING_MODEL, IndexerConfig, Metric, ReadinessPolicy,
};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "MEDIPHANT";
const SECTIONS: [&str; 6] = [
    "corpus",
    "embedding",
    "generation",
    "vector_store",
    "indexer",
    "query",
];

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediphantConfig {
    /// Corpus location.
    pub corpus: CorpusConfig,

    /// Embedding provider, used for indexing and for questions.
    pub embedding: EmbeddingConfig,

    /// Generative model.
    pub generation: GenerationConfig,

    /// Vector store backend and index.
    pub vector_store: VectorStoreConfig,

    /// Indexing run settings.
    pub indexer: IndexerSettings,

    /// Query settings.
    pub query: QueryConfig,
}

/// Corpus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Path to the corpus text file.
    pub path: Option<String>,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "gemini", "fastembed", or "mock".
    pub provider: String,

    /// Model identifier.
    pub model: String,

    /// Output dimension; the index is created with this dimension.
    pub dimension: usize,

    /// API key; falls back to `GEMINI_API_KEY`.
    pub api_key: Option<String>,

    /// Alternative API root.
    pub base_url: Option<String>,

    /// Texts per embedding request.
    pub batch_size: usize,

    /// Model cache directory for local models.
    pub cache_dir: Option<String>,
}

/// Generative model configuration.
///
/// Answers are always generated at temperature 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// "gemini", "claude", or "mock".
    pub provider: String,

    /// Model identifier.
    pub model: String,

    /// API key; falls back to `GEMINI_API_KEY` or `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    /// Completion token limit.
    pub max_tokens: u32,
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// "local", "memory", "pinecone", or "lancedb".
    pub backend: String,

    /// Index name.
    pub index_name: String,

    /// "cosine", "dotproduct", or "euclidean".
    pub metric: String,

    /// Cloud hint for hosted stores.
    pub cloud: String,

    /// Region hint for hosted stores.
    pub region: String,

    /// Data directory of the local and LanceDB backends.
    pub data_dir: Option<String>,

    /// API key; falls back to `PINECONE_API_KEY`.
    pub api_key: Option<String>,

    /// How long to wait for a new index to become ready.
    pub readiness_timeout_secs: u64,
}

/// Indexing run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// Batches embedded and upserted at once.
    pub concurrency: usize,

    /// Chunks per batch.
    pub batch_size: usize,
}

/// Query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Paragraphs retrieved per question.
    pub top_k: usize,

    /// Limit on each provider call.
    pub request_timeout_secs: u64,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_GEMINI_DIMENSION,
            api_key: None,
            base_url: None,
            batch_size: 100,
            cache_dir: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: mediphant_llm::DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            index_name: "mediphant-faq".to_string(),
            metric: Metric::Cosine.as_str().to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            data_dir: None,
            api_key: None,
            readiness_timeout_secs: 120,
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            request_timeout_secs: 30,
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl MediphantConfig {
    /// Load configuration from file, environment, and defaults.
    ///
    /// Environment values arrive as strings, so the `MEDIPHANT_*` overlay is
    /// reliable for string fields only.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level(ENV_PREFIX);
        for section in SECTIONS {
            env_opts.add_section(section);
        }
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("MEDIPHANT_CONFIG") {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mediphant").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into environment variable pairs with `MEDIPHANT_` prefix.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value: toml::Value =
            toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, ENV_PREFIX, &mut vars);
        Ok(vars)
    }

    /// Directory of the local and LanceDB backends.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.vector_store.data_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => dirs::data_dir()
                .map(|d| d.join("mediphant"))
                .ok_or_else(|| Error::config("Could not determine data directory")),
        }
    }

    /// Limit on each provider call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.query.request_timeout_secs.max(1))
    }

    /// Indexer settings for `index_name`.
    pub fn indexer_config(&self, index_name: &str) -> Result<IndexerConfig> {
        let metric: Metric = self.vector_store.metric.parse()?;
        Ok(IndexerConfig::new(index_name, self.embedding.dimension)
            .with_metric(metric)
            .with_location(&self.vector_store.cloud, &self.vector_store.region)
            .with_concurrency(self.indexer.concurrency)
            .with_batch_size(self.indexer.batch_size)
            .with_readiness(ReadinessPolicy::with_timeout(Duration::from_secs(
                self.vector_store.readiness_timeout_secs,
            ))))
    }

    /// Gemini key for embeddings.
    pub fn embedding_api_key(&self) -> Option<String> {
        secret_or_env(self.embedding.api_key.as_deref(), "GEMINI_API_KEY")
    }

    /// Key for the configured generation provider.
    pub fn generation_api_key(&self) -> Option<String> {
        let fallback = match self.generation.provider.as_str() {
            "claude" => "ANTHROPIC_API_KEY",
            _ => "GEMINI_API_KEY",
        };
        secret_or_env(self.generation.api_key.as_deref(), fallback)
    }

    /// Pinecone key.
    pub fn vector_store_api_key(&self) -> Option<String> {
        secret_or_env(self.vector_store.api_key.as_deref(), "PINECONE_API_KEY")
    }
}

/// A configured secret, or the named environment variable when unset or blank.
fn secret_or_env(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|s| !s.trim().is_empty())
        })
}

// ============================================================================
// Helper: flatten TOML to env vars
// ============================================================================

/// Recursively flatten a TOML value into `KEY=value` pairs.
fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let env_key = format!("{}_{}", prefix, key.to_uppercase());
                flatten_toml_value(val, &env_key, out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
