//! End-to-end tests: index a corpus with the mock embedder and the in-memory
//! store, then answer questions through the full pipeline.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mediphant_core::{Error, Result};
use mediphant_llm::MockLlmProvider;
use mediphant_rag::{
    FaqPipeline, GROUNDING_INSTRUCTION, INTERNAL_ERROR_MESSAGE, MISSING_QUERY_MESSAGE,
    FaqResponse, respond,
};
use mediphant_vector::{
    CorpusSource, EmbeddingProvider, IndexSpec, IndexStatus, Indexer, IndexerConfig,
    MemoryVectorStore, MockEmbeddingProvider, ReadinessPolicy, VectorStore,
};

const DIM: usize = 64;
const MORNING: &str = "Take your medication every morning.";
const WARFARIN: &str = "Warfarin interacts with many foods.";

/// Mock embedder that counts calls.
struct CountingEmbedder {
    inner: MockEmbeddingProvider,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: MockEmbeddingProvider::new(DIM),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

async fn indexed_store(corpus: &str) -> Arc<MemoryVectorStore> {
    let store = Arc::new(MemoryVectorStore::new());
    let indexer = Indexer::new(
        Arc::new(MockEmbeddingProvider::new(DIM)),
        store.clone(),
        IndexerConfig::new("faq", DIM),
    );
    let report = indexer
        .run(&CorpusSource::Text(corpus.to_string()))
        .await
        .unwrap();
    assert_ne!(report.status, IndexStatus::Partial);
    store
}

fn pipeline_with(
    store: Arc<MemoryVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: MockLlmProvider,
    top_k: usize,
) -> FaqPipeline {
    FaqPipeline::builder()
        .embedder(embedder)
        .store(store)
        .llm(Arc::new(llm))
        .index_name("faq")
        .top_k(top_k)
        .build()
        .unwrap()
}

#[tokio::test]
async fn two_paragraph_corpus_ranks_relevant_paragraph_first() {
    let store = indexed_store(&format!("{MORNING}\n\n{WARFARIN}")).await;
    let llm = MockLlmProvider::with_response("Take it every morning.");
    let pipeline = pipeline_with(
        store,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        llm.clone(),
        2,
    );

    let result = pipeline
        .answer("When should I take my medication?")
        .await
        .unwrap();

    assert_eq!(result.answer, "Take it every morning.");
    assert_eq!(result.matches.len(), 2);
    assert_eq!(result.matches[0].text, MORNING);
    assert_eq!(result.matches[1].text, WARFARIN);
    assert!(result.matches[0].score > result.matches[1].score);

    let requests = llm.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, 0.0);
    let prompt = &requests[0].prompt;
    assert!(prompt.contains(GROUNDING_INSTRUCTION));
    assert!(prompt.contains(&format!("{MORNING}\n\n{WARFARIN}")));
}

#[tokio::test]
async fn default_top_k_caps_matches_at_three() {
    let corpus = "Alpha paragraph.\n\nBeta paragraph.\n\nGamma paragraph.\n\nDelta paragraph.\n\nEpsilon paragraph.";
    let store = indexed_store(corpus).await;
    let pipeline = FaqPipeline::builder()
        .embedder(Arc::new(MockEmbeddingProvider::new(DIM)))
        .store(store)
        .llm(Arc::new(MockLlmProvider::with_response("ok")))
        .index_name("faq")
        .build()
        .unwrap();

    let result = pipeline.answer("Which paragraph?").await.unwrap();
    assert_eq!(result.matches.len(), 3);
    for pair in result.matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn indexed_paragraph_is_its_own_best_match() {
    let paragraphs = [
        "Store insulin in the refrigerator before opening.",
        "Ibuprofen should be taken with food to avoid stomach upset.",
        "Missed doses of antibiotics should be taken as soon as remembered.",
        MORNING,
        WARFARIN,
    ];
    let store = indexed_store(&paragraphs.join("\n\n")).await;
    let pipeline = pipeline_with(
        store,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        MockLlmProvider::with_response(""),
        paragraphs.len(),
    );

    for paragraph in paragraphs {
        let matches = pipeline.retrieve(paragraph, 3).await.unwrap();
        assert_eq!(matches[0].text, paragraph);
        assert!(matches.iter().all(|m| m.score <= matches[0].score));
    }
}

#[tokio::test]
async fn blank_question_never_reaches_a_provider() {
    let store = indexed_store(MORNING).await;
    let embedder = Arc::new(CountingEmbedder::new());
    let llm = MockLlmProvider::with_response("unused");
    let pipeline = pipeline_with(store, embedder.clone(), llm.clone(), 3);

    for question in ["", "   "] {
        let err = pipeline.answer(question).await.unwrap_err();
        assert!(err.is_invalid_input());
    }
    assert_eq!(embedder.calls(), 0);
    assert_eq!(llm.call_count().await, 0);

    pipeline.answer("When?").await.unwrap();
    assert_eq!(embedder.calls(), 1);
    assert_eq!(llm.call_count().await, 1);
}

#[tokio::test]
async fn empty_index_still_asks_with_grounding_instruction() {
    let store = indexed_store("   \n\n  ").await;
    let llm = MockLlmProvider::with_response("I don't have enough information.");
    let pipeline = pipeline_with(
        store,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        llm.clone(),
        3,
    );

    let result = pipeline.answer("Is aspirin safe?").await.unwrap();
    assert!(result.matches.is_empty());
    assert_eq!(result.answer, "I don't have enough information.");

    let prompt = llm.requests().await[0].prompt.clone();
    assert!(prompt.contains(GROUNDING_INSTRUCTION));
    assert!(prompt.contains("Context:\n\n\nQuestion:"));
}

#[tokio::test]
async fn generation_failure_is_generic() {
    let store = indexed_store(MORNING).await;
    let pipeline = pipeline_with(
        store,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        MockLlmProvider::failing("quota exceeded for key sk-live-123"),
        3,
    );

    let err = pipeline.answer("When?").await.unwrap_err();
    assert_eq!(err.to_string(), INTERNAL_ERROR_MESSAGE);
    assert!(!err.to_string().contains("sk-live-123"));
    assert!(err.internal().is_some_and(Error::is_provider));
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let store = indexed_store(MORNING).await;
    let pipeline = FaqPipeline::builder()
        .embedder(Arc::new(MockEmbeddingProvider::new(DIM)))
        .store(store)
        .llm(Arc::new(
            MockLlmProvider::with_response("late").with_delay(Duration::from_secs(60)),
        ))
        .index_name("faq")
        .call_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let err = pipeline.answer("When?").await.unwrap_err();
    assert_eq!(err.to_string(), INTERNAL_ERROR_MESSAGE);
    assert!(matches!(err.internal(), Some(Error::Timeout { .. })));
}

#[tokio::test]
async fn respond_maps_outcomes_to_status_codes() {
    let store = indexed_store(MORNING).await;
    let ok = pipeline_with(
        store.clone(),
        Arc::new(MockEmbeddingProvider::new(DIM)),
        MockLlmProvider::with_response("Every morning."),
        3,
    );

    let reply = respond(&ok, Some("When should I take my medication?")).await;
    assert_eq!(reply.status, 200);
    let json: serde_json::Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
    assert_eq!(json["answer"], "Every morning.");
    assert_eq!(json["matches"][0]["text"], MORNING);
    assert!(json["matches"][0]["score"].is_number());

    for q in [None, Some(""), Some("  ")] {
        let reply = respond(&ok, q).await;
        assert_eq!(reply.status, 400);
        match reply.body {
            FaqResponse::Error(body) => assert_eq!(body.error, MISSING_QUERY_MESSAGE),
            FaqResponse::Answer(_) => unreachable!("blank q must not be answered"),
        }
    }

    let failing = pipeline_with(
        store,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        MockLlmProvider::failing("boom"),
        3,
    );
    let reply = respond(&failing, Some("When?")).await;
    assert_eq!(reply.status, 500);
    assert_eq!(
        reply.to_json().unwrap(),
        r#"{"error":"An internal server error occurred."}"#
    );
}

#[tokio::test]
async fn dimension_mismatch_fails_fast() {
    let store = indexed_store(MORNING).await;

    let err = store
        .ensure_index(&IndexSpec::new("faq", 32), &ReadinessPolicy::default())
        .await
        .unwrap_err();
    assert!(err.is_config());

    let mismatched = pipeline_with(
        store.clone(),
        Arc::new(MockEmbeddingProvider::new(32)),
        MockLlmProvider::with_response("unused"),
        3,
    );
    assert!(mismatched.check_index().await.unwrap_err().is_config());

    let err = mismatched.answer("When?").await.unwrap_err();
    assert!(err.internal().is_some_and(Error::is_config));
    assert_eq!(store.len("faq").await, Some(1));

    let indexer = Indexer::new(
        Arc::new(MockEmbeddingProvider::new(32)),
        store,
        IndexerConfig::new("faq", DIM),
    );
    let err = indexer
        .run(&CorpusSource::Text(MORNING.to_string()))
        .await
        .unwrap_err();
    assert!(err.is_config());
}
