//! Construct providers and stores from configuration.

use std::sync::Arc;

use mediphant_core::{Error, Result};
use mediphant_llm::{ClaudeProvider, GeminiProvider, LlmProvider, MockLlmProvider};
use mediphant_vector::{
    EmbeddingProvider, GeminiEmbeddingProvider, MemoryVectorStore, MockEmbeddingProvider,
    PineconeVectorStore, VectorStore,
};

use crate::config::MediphantConfig;

/// Embedding provider named by `embedding.provider`.
pub fn build_embedder(config: &MediphantConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let settings = &config.embedding;
    match settings.provider.as_str() {
        "gemini" => {
            let key = config
                .embedding_api_key()
                .ok_or_else(|| missing_key("embedding", "GEMINI_API_KEY"))?;
            let mut provider = GeminiEmbeddingProvider::new(
                &key,
                &settings.model,
                settings.dimension,
                config.request_timeout(),
            )?
            .with_batch_size(settings.batch_size);
            if let Some(url) = &settings.base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        "mock" => Ok(Arc::new(MockEmbeddingProvider::new(settings.dimension))),
        "fastembed" => build_fastembed(config),
        other => Err(Error::config(format!(
            "Unknown embedding provider: '{other}'. Supported: gemini, fastembed, mock"
        ))),
    }
}

#[cfg(feature = "vector-fastembed")]
fn build_fastembed(config: &MediphantConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let cache_dir = config
        .embedding
        .cache_dir
        .as_ref()
        .map(std::path::PathBuf::from);
    Ok(Arc::new(mediphant_vector::FastEmbedProvider::new(
        &config.embedding.model,
        cache_dir,
    )?))
}

#[cfg(not(feature = "vector-fastembed"))]
fn build_fastembed(_config: &MediphantConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(Error::config(
        "mediphant was built without the 'vector-fastembed' feature",
    ))
}

/// Vector store named by `vector_store.backend`.
pub async fn build_store(config: &MediphantConfig) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend.as_str() {
        "local" => Ok(Arc::new(MemoryVectorStore::with_data_dir(
            config.data_dir()?,
        ))),
        "memory" => {
            tracing::warn!("The 'memory' backend keeps nothing after the process exits");
            Ok(Arc::new(MemoryVectorStore::new()))
        }
        "pinecone" => {
            let key = config
                .vector_store_api_key()
                .ok_or_else(|| missing_key("vector_store", "PINECONE_API_KEY"))?;
            Ok(Arc::new(PineconeVectorStore::new(
                &key,
                config.request_timeout(),
            )?))
        }
        "lancedb" => build_lancedb(config).await,
        other => Err(Error::config(format!(
            "Unknown vector store backend: '{other}'. Supported: local, memory, pinecone, lancedb"
        ))),
    }
}

#[cfg(feature = "vector-lancedb")]
async fn build_lancedb(config: &MediphantConfig) -> Result<Arc<dyn VectorStore>> {
    let uri = config.data_dir()?.join("lancedb");
    let store = mediphant_vector::LancedbVectorStore::connect(&uri.to_string_lossy()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "vector-lancedb"))]
async fn build_lancedb(_config: &MediphantConfig) -> Result<Arc<dyn VectorStore>> {
    Err(Error::config(
        "mediphant was built without the 'vector-lancedb' feature",
    ))
}

/// Generative model named by `generation.provider`.
pub fn build_llm(config: &MediphantConfig) -> Result<Arc<dyn LlmProvider>> {
    let settings = &config.generation;
    match settings.provider.as_str() {
        "gemini" => {
            let key = config
                .generation_api_key()
                .ok_or_else(|| missing_key("generation", "GEMINI_API_KEY"))?;
            Ok(Arc::new(GeminiProvider::new(
                &key,
                &settings.model,
                config.request_timeout(),
            )?))
        }
        "claude" => {
            let key = config
                .generation_api_key()
                .ok_or_else(|| missing_key("generation", "ANTHROPIC_API_KEY"))?;
            Ok(Arc::new(ClaudeProvider::new(
                key,
                &settings.model,
                config.request_timeout(),
            )?))
        }
        "mock" => Ok(Arc::new(MockLlmProvider::with_response(
            "I don't have enough information.",
        ))),
        other => Err(Error::config(format!(
            "Unknown generation provider: '{other}'. Supported: gemini, claude, mock"
        ))),
    }
}

fn missing_key(section: &str, env_var: &str) -> Error {
    Error::config(format!(
        "No API key for [{section}]: set {section}.api_key or {env_var}"
    ))
}
