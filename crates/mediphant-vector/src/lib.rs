//! Retrieval infrastructure for Mediphant.
//!
//! This crate turns a corpus into a searchable vector index and answers
//! nearest-neighbor queries against it.
//!
//! # Features
//!
//! - `vector-lancedb`: Enable LanceDB-based local vector storage
//! - `vector-fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     mediphant-vector                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ParagraphChunker (blank-line splitting)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── GeminiEmbeddingProvider (always available)             │
//! │  └── FastEmbedProvider (feature: vector-fastembed)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorStore trait (ensure_index, upsert, query)            │
//! │  ├── MemoryVectorStore (JSON snapshots, default backend)    │
//! │  ├── PineconeVectorStore (hosted)                           │
//! │  └── LancedbVectorStore (feature: vector-lancedb)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Indexer (chunk, embed, bounded-concurrency upsert)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![doc = include_str!("../README.md")]

// Core modules (always available)
pub mod chunker;
pub mod embedding;
pub mod store;
pub mod types;

// Backends (always available)
pub mod gemini;
pub mod memory;
pub mod persistence;
pub mod pinecone;

// Orchestration
pub mod indexer;

// Feature-gated backend modules
#[cfg(feature = "vector-fastembed")]
pub mod fastembed;

#[cfg(feature = "vector-lancedb")]
pub mod lancedb;

// Re-exports: core types
pub use types::{
    Chunk, IndexDescription, IndexEntry, IndexSpec, Match, Metric, ReadinessPolicy,
    UpsertReport, content_id,
};

// Re-exports: traits and implementations
pub use chunker::{ParagraphChunker, chunk_paragraphs};
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use gemini::{
    DEFAULT_GEMINI_DIMENSION, DEFAULT_GEMINI_EMBEDDING_MODEL, GeminiEmbeddingProvider,
};
pub use memory::MemoryVectorStore;
pub use pinecone::{DEFAULT_PINECONE_CONTROL_URL, PineconeVectorStore};
pub use store::{VectorStore, check_compatible, upsert_in_batches, wait_until_ready};

// Re-exports: indexing
pub use indexer::{
    CorpusSource, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, IndexReport, IndexStatus, Indexer,
    IndexerConfig,
};

// Feature-gated re-exports
#[cfg(feature = "vector-fastembed")]
pub use fastembed::FastEmbedProvider;

#[cfg(feature = "vector-lancedb")]
pub use lancedb::LancedbVectorStore;
