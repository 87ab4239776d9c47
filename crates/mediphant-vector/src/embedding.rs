//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! different embedding generation backends (Gemini, fastembed, etc.).
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic hashed bag-of-words vectors for testing
//! - `GeminiEmbeddingProvider`: Google Generative Language API
//! - `FastEmbedProvider`: Local embedding via fastembed (requires `vector-fastembed` feature)
//!
//! The same provider, model, and dimension must be used at index time and at
//! query time. Vectors from different models are not comparable.

use async_trait::async_trait;
use mediphant_core::{Error, Result};

/// Trait for generating text embeddings.
///
/// Implementations wrap specific embedding services and provide a uniform
/// async interface. The trait requires `Send + Sync` to allow safe sharing
/// across async tasks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    ///
    /// Fails with `InvalidInput` for empty text and `Provider` for
    /// network, auth, or quota failures.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, one per input, in input order.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// Identifier of the model producing the vectors (e.g. "gemini-embedding-001").
    fn model_id(&self) -> &str;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// Reject text that is empty after trimming.
pub fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::invalid_input("cannot embed empty text"));
    }
    Ok(())
}

/// Fail with a configuration error when `vector` is not `expected` long.
pub fn check_dimension(provider: &str, vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::config(format!(
            "{provider} returned a {}-dimensional vector, expected {expected}",
            vector.len()
        )));
    }
    Ok(())
}

/// A mock embedding provider for testing.
///
/// Produces a hashed bag-of-words vector: each lower-cased alphanumeric token
/// is hashed (FNV-1a) into one of `dimension` buckets, and the counts are
/// normalized to a unit vector. Texts that share words have positive cosine
/// similarity and identical texts have identical vectors.
pub struct MockEmbeddingProvider {
    dimension: usize,
    model: String,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "mock-bow".to_string(),
        }
    }

    /// Override the reported model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            embedding[bucket] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;
        Ok(self.bag_of_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                ensure_embeddable(t)?;
                Ok(self.bag_of_words(t))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Metric;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(384);
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.model_id(), "mock-bow");
    }

    #[tokio::test]
    async fn test_mock_embed_single() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider.embed("hello world").await.unwrap();

        assert_eq!(embedding.len(), 8);

        // Verify unit-normalized
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider.embed("same text").await.unwrap();
        let e2 = provider.embed("same text").await.unwrap();

        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_case_and_punctuation_insensitive() {
        let provider = MockEmbeddingProvider::new(64);
        let e1 = provider.embed("Take your medication.").await.unwrap();
        let e2 = provider.embed("take YOUR medication").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_shared_words_rank_higher() {
        let provider = MockEmbeddingProvider::new(64);
        let question = provider.embed("When should I take my medication?").await.unwrap();
        let related = provider
            .embed("Take your medication every morning.")
            .await
            .unwrap();
        let unrelated = provider
            .embed("Warfarin interacts with many foods.")
            .await
            .unwrap();

        let related_score = Metric::Cosine.score(&question, &related);
        let unrelated_score = Metric::Cosine.score(&question, &unrelated);
        assert!(related_score > unrelated_score);
    }

    #[tokio::test]
    async fn test_mock_embed_batch_preserves_order() {
        let provider = MockEmbeddingProvider::new(32);
        let texts = vec!["hello", "world", "test"];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for (text, emb) in texts.iter().zip(&embeddings) {
            assert_eq!(emb, &provider.embed(text).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_mock_embed_empty_text_rejected() {
        let provider = MockEmbeddingProvider::new(4);
        let err = provider.embed("   ").await.unwrap_err();
        assert!(err.is_invalid_input());

        let err = provider.embed_batch(&["ok", ""]).await.unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_mock_embed_batch_empty() {
        let provider = MockEmbeddingProvider::new(4);
        let texts: Vec<&str> = vec![];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert!(embeddings.is_empty());
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension("gemini", &[0.0; 4], 4).is_ok());
        let err = check_dimension("gemini", &[0.0; 3], 4).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("3-dimensional"));
    }

    #[test]
    fn test_trait_object_safety() {
        // Verify EmbeddingProvider can be used as a trait object
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
