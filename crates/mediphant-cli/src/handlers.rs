//! Handlers for `mediphant index` and `mediphant ask`.

use std::path::PathBuf;
use std::sync::Arc;

use mediphant_core::{Error, Result};
use mediphant_llm::{LlmProvider, MockLlmProvider};
use mediphant_rag::{FaqError, FaqPipeline, FaqResult};
use mediphant_vector::{
    CorpusSource, EmbeddingProvider, IndexReport, IndexStatus, Indexer, Match, VectorStore,
};

use crate::config::MediphantConfig;
use crate::providers;

/// Options of `mediphant index`.
#[derive(Debug, Default)]
pub struct IndexOptions {
    /// Corpus file override.
    pub corpus: Option<String>,
    /// Index name override.
    pub index: Option<String>,
    /// Concurrency override.
    pub concurrency: Option<usize>,
}

/// Options of `mediphant ask`.
#[derive(Debug, Default)]
pub struct AskOptions {
    /// The question.
    pub question: String,
    /// Retrieval depth override.
    pub top_k: Option<usize>,
    /// Print JSON.
    pub json: bool,
    /// Skip generation.
    pub dry_run: bool,
}

// ============================================================================
// index
// ============================================================================

/// Run a full indexing pass with providers built from `config`.
pub async fn handle_index(config: &MediphantConfig, options: IndexOptions) -> Result<()> {
    let embedder = providers::build_embedder(config)?;
    let store = providers::build_store(config).await?;
    let report = run_index(config, embedder, store, &options).await?;
    print_index_report(&report);
    report.into_result().map(|_| ())
}

async fn run_index(
    config: &MediphantConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    options: &IndexOptions,
) -> Result<IndexReport> {
    let corpus = options
        .corpus
        .clone()
        .or_else(|| config.corpus.path.clone())
        .ok_or_else(|| Error::config("No corpus: pass --corpus or set corpus.path"))?;
    let index_name = options
        .index
        .as_deref()
        .unwrap_or(&config.vector_store.index_name);

    let mut indexer_config = config.indexer_config(index_name)?;
    if let Some(concurrency) = options.concurrency {
        indexer_config = indexer_config.with_concurrency(concurrency);
    }

    Indexer::new(embedder, store, indexer_config)
        .run(&CorpusSource::Path(PathBuf::from(corpus)))
        .await
}

fn print_index_report(report: &IndexReport) {
    match report.status {
        IndexStatus::Empty => {
            println!(
                "Corpus contains no paragraphs; nothing indexed into '{}'.",
                report.index_name
            );
        }
        IndexStatus::Complete | IndexStatus::Partial => {
            println!(
                "Index '{}': {} chunks, {} embedded, {} duplicates, {} upserted, {} failed ({} ms)",
                report.index_name,
                report.chunks,
                report.embedded,
                report.duplicates,
                report.upserted,
                report.failed,
                report.duration_ms
            );
            for error in &report.errors {
                eprintln!("  {error}");
            }
        }
    }
}

// ============================================================================
// ask
// ============================================================================

/// Answer one question with providers built from `config`.
pub async fn handle_ask(config: &MediphantConfig, options: AskOptions) -> Result<()> {
    let embedder = providers::build_embedder(config)?;
    let store = providers::build_store(config).await?;
    let llm: Arc<dyn LlmProvider> = if options.dry_run {
        // Never called in a dry run.
        Arc::new(MockLlmProvider::new(Vec::new()))
    } else {
        providers::build_llm(config)?
    };
    let pipeline = build_pipeline(config, embedder, store, llm, options.top_k)?;
    pipeline.check_index().await?;

    if options.dry_run {
        let matches = pipeline
            .retrieve(&options.question, pipeline.top_k())
            .await
            .map_err(into_core)?;
        print_matches(&matches);
        println!("\n{}", pipeline.build_prompt(&options.question, &matches));
        return Ok(());
    }

    let result = pipeline.answer(&options.question).await.map_err(into_core)?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn build_pipeline(
    config: &MediphantConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    top_k: Option<usize>,
) -> Result<FaqPipeline> {
    FaqPipeline::builder()
        .embedder(embedder)
        .store(store)
        .llm(llm)
        .index_name(&config.vector_store.index_name)
        .top_k(top_k.unwrap_or(config.query.top_k))
        .call_timeout(config.request_timeout())
        .max_tokens(config.generation.max_tokens)
        .build()
}

/// The CLI is an operator tool, so it reports the underlying failure.
fn into_core(err: FaqError) -> Error {
    match err {
        FaqError::InvalidInput(msg) => Error::invalid_input(msg),
        FaqError::Internal(source) => source,
    }
}

fn print_result(result: &FaqResult) {
    println!("{}", result.answer.trim());
    if !result.matches.is_empty() {
        println!("\nSources:");
        print_matches(&result.matches);
    }
}

fn print_matches(matches: &[Match]) {
    for m in matches {
        println!("  [{:.3}] {}", m.score, m.text);
    }
}
