//! The query/synthesis pipeline.
//!
//! One question is answered in three sequential provider calls: embed the
//! question, query the vector store, and ask the generative model. Each call
//! is bounded by the pipeline's call timeout, and dropping the returned
//! future cancels whichever call is in flight. The pipeline holds no mutable
//! state, so one instance can serve any number of concurrent questions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mediphant_core::{Error, Result};
use mediphant_llm::{CompletionRequest, LlmProvider};
use mediphant_vector::{EmbeddingProvider, IndexDescription, Match, VectorStore};
use serde::{Deserialize, Serialize};

use crate::error::FaqError;
use crate::prompt::{PromptTemplate, assemble_context};

/// Default number of paragraphs retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Default limit on each provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Answer plus the paragraphs it was grounded on.
///
/// Serializes as `{"answer": ..., "matches": [{"text": ..., "score": ...}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqResult {
    /// Model output, verbatim.
    pub answer: String,

    /// Retrieved paragraphs, highest score first.
    pub matches: Vec<Match>,
}

/// Retrieval-augmented FAQ answering.
pub struct FaqPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    index_name: String,
    top_k: usize,
    call_timeout: Duration,
    max_tokens: u32,
    template: PromptTemplate,
}

impl FaqPipeline {
    /// Start building a pipeline.
    pub fn builder() -> FaqPipelineBuilder {
        FaqPipelineBuilder::default()
    }

    /// Index the pipeline queries.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Paragraphs retrieved per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// Fails with `FaqError::InvalidInput` for a blank question before any
    /// provider is called. Every other failure is `FaqError::Internal`,
    /// logged here with its detail. Zero matches is not an error: the model
    /// is asked with an empty context and the prompt's grounding instruction
    /// makes it say it lacks the information.
    pub async fn answer(&self, question: &str) -> std::result::Result<FaqResult, FaqError> {
        let question = validate_question(question)?;
        self.answer_validated(question).await.map_err(|e| {
            tracing::error!(index = %self.index_name, error = %e, "FAQ pipeline failed");
            FaqError::Internal(e)
        })
    }

    /// Embed `question` and return its `k` nearest paragraphs without
    /// calling the generative model.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
    ) -> std::result::Result<Vec<Match>, FaqError> {
        let question = validate_question(question)?;
        self.retrieve_validated(question, k).await.map_err(|e| {
            tracing::error!(index = %self.index_name, error = %e, "FAQ retrieval failed");
            FaqError::Internal(e)
        })
    }

    /// The exact prompt sent to the model for `question` and `matches`.
    pub fn build_prompt(&self, question: &str, matches: &[Match]) -> String {
        self.template
            .render(&assemble_context(matches), question.trim())
    }

    /// Check that the index exists and was built for this pipeline's
    /// embedding model and dimension.
    pub async fn check_index(&self) -> Result<IndexDescription> {
        let description = self
            .store
            .describe_index(&self.index_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("index '{}'", self.index_name)))?;

        if description.dimension != self.embedder.dimension() {
            return Err(Error::config(format!(
                "index '{}' has dimension {}, but {} produces {}",
                self.index_name,
                description.dimension,
                self.embedder.model_id(),
                self.embedder.dimension()
            )));
        }
        if let Some(model) = &description.embedding_model
            && model != self.embedder.model_id()
        {
            return Err(Error::config(format!(
                "index '{}' was built with '{model}', questions are embedded with '{}'",
                self.index_name,
                self.embedder.model_id()
            )));
        }
        Ok(description)
    }

    async fn answer_validated(&self, question: &str) -> Result<FaqResult> {
        let matches = self.retrieve_validated(question, self.top_k).await?;
        let prompt = self.build_prompt(question, &matches);

        let request = CompletionRequest::new(prompt)
            .with_temperature(0.0)
            .with_max_tokens(self.max_tokens);
        let completion = self.timed("generate answer", self.llm.complete(request)).await?;

        tracing::info!(
            index = %self.index_name,
            matches = matches.len(),
            output_tokens = completion.tokens_used.output,
            "Answered FAQ question"
        );
        Ok(FaqResult {
            answer: completion.content,
            matches,
        })
    }

    async fn retrieve_validated(&self, question: &str, k: usize) -> Result<Vec<Match>> {
        let vector = self
            .timed("embed question", self.embedder.embed(question))
            .await?;
        let matches = self
            .timed(
                "query vector store",
                self.store.query(&self.index_name, &vector, k),
            )
            .await?;
        tracing::debug!(index = %self.index_name, k, found = matches.len(), "Retrieved matches");
        Ok(matches)
    }

    async fn timed<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| Error::timeout(operation, self.call_timeout))?
    }
}

fn validate_question(question: &str) -> std::result::Result<&str, FaqError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(FaqError::InvalidInput("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

impl std::fmt::Debug for FaqPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaqPipeline")
            .field("embedder", &self.embedder.name())
            .field("store", &self.store.name())
            .field("llm", &self.llm.name())
            .field("index_name", &self.index_name)
            .field("top_k", &self.top_k)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Builder for [`FaqPipeline`].
#[derive(Default)]
pub struct FaqPipelineBuilder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    llm: Option<Arc<dyn LlmProvider>>,
    index_name: Option<String>,
    top_k: Option<usize>,
    call_timeout: Option<Duration>,
    max_tokens: Option<u32>,
    template: Option<PromptTemplate>,
}

impl FaqPipelineBuilder {
    /// Embedding provider; must be the one the index was built with.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Vector store holding the index.
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Generative model.
    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Index to query.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Paragraphs retrieved per question (default 3).
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Limit on each provider call (default 30s).
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Completion token limit.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the prompt template. It must carry the grounding instruction.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Build the pipeline. Fails if a provider or the index name is missing,
    /// `top_k` is zero, or the template lacks the grounding instruction.
    pub fn build(self) -> Result<FaqPipeline> {
        let embedder = self
            .embedder
            .ok_or_else(|| Error::config("FAQ pipeline needs an embedding provider"))?;
        let store = self
            .store
            .ok_or_else(|| Error::config("FAQ pipeline needs a vector store"))?;
        let llm = self
            .llm
            .ok_or_else(|| Error::config("FAQ pipeline needs an LLM provider"))?;
        let index_name = self
            .index_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::config("FAQ pipeline needs an index name"))?;

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(Error::config("top_k must be at least 1"));
        }
        let template = self.template.unwrap_or_default();
        if !template.is_grounded() {
            return Err(Error::config(
                "prompt template must contain the grounding instruction verbatim",
            ));
        }

        Ok(FaqPipeline {
            embedder,
            store,
            llm,
            index_name,
            top_k,
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            template,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
