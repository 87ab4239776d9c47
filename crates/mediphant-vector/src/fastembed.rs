//! Local embedding provider backed by `fastembed`.
//!
//! Useful for offline development: the corpus and questions are embedded on
//! the local machine with a small ONNX model instead of a hosted API. The
//! model runs on a blocking thread and is shared behind a mutex.
//!
//! This module requires the `vector-fastembed` feature.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediphant_core::{Error, Result};

use crate::embedding::{EmbeddingProvider, ensure_embeddable};

/// Local models the provider knows about, with their output dimension.
///
/// | Name | Dimension |
/// |------|-----------|
/// | `bge-small-en-v1.5` | 384 |
/// | `all-minilm-l6-v2` | 384 |
/// | `bge-base-en-v1.5` | 768 |
/// | `bge-large-en-v1.5` | 1024 |
const KNOWN_MODELS: &[(&str, usize)] = &[
    ("bge-small-en-v1.5", 384),
    ("all-minilm-l6-v2", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
];

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    let model = match name {
        "bge-small-en-v1.5" => fastembed::EmbeddingModel::BGESmallENV15,
        "all-minilm-l6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
        "bge-base-en-v1.5" => fastembed::EmbeddingModel::BGEBaseENV15,
        "bge-large-en-v1.5" => fastembed::EmbeddingModel::BGELargeENV15,
        other => {
            let supported: Vec<&str> = KNOWN_MODELS.iter().map(|(n, _)| *n).collect();
            return Err(Error::config(format!(
                "Unknown local embedding model: '{other}'. Supported: {}",
                supported.join(", ")
            )));
        }
    };
    let dimension = KNOWN_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or_default();
    Ok((model, dimension))
}

/// Embedding provider running a fastembed model in-process.
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it into `cache_dir` on first use.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let (model, dimension) = resolve_model(model_name)?;

        let mut init = fastembed::InitOptions::new(model);
        if let Some(dir) = cache_dir {
            init = init.with_cache_dir(dir);
        }
        let text_embedding = fastembed::TextEmbedding::try_new(init).map_err(|e| {
            Error::provider("fastembed", format!("failed to load '{model_name}': {e}"))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::provider("fastembed", format!("model lock poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::provider("fastembed", format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::provider("fastembed", format!("embedding task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("fastembed", "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_embeddable(text)?;
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_name
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
