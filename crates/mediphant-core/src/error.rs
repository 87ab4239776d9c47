//! Error types for Mediphant operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all Mediphant crates. Uses `thiserror` for derive macros.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in Mediphant operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error, optionally tied to the path being read or written.
    #[error("I/O error{}: {source}", display_path(.path.as_deref()))]
    Io {
        /// Underlying error.
        #[source]
        source: std::io::Error,
        /// Path involved, when known.
        path: Option<PathBuf>,
    },

    /// Configuration error (missing keys, dimension mismatches, unknown backends).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied input that can never succeed (empty question, empty text).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A remote embedding, generation, or vector store call failed.
    #[error("{provider} error: {message}")]
    Provider {
        /// Provider that failed (e.g. "gemini", "pinecone").
        provider: String,
        /// Failure detail. Never shown to end users.
        message: String,
    },

    /// Some chunks of an indexing run were written and some were not.
    #[error("Indexing incomplete: {succeeded} of {attempted} chunks upserted, {failed} failed")]
    PartialIndexing {
        /// Chunks submitted to the run.
        attempted: usize,
        /// Chunks embedded and upserted.
        succeeded: usize,
        /// Chunks that failed to embed or upsert.
        failed: usize,
    },

    /// A provider call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Configured limit.
        after: Duration,
    },

    /// A vector index exists but is not ready to accept writes.
    #[error("Index not ready: {0}")]
    NotReady(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a not-ready error.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wrap an I/O error together with the path it concerns.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// True for errors the caller caused and that must never be retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// True for configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// True for failures of a remote service, including timeouts.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::Timeout { .. } | Self::NotReady(_)
        )
    }

    /// True while an index is still being provisioned.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

/// Result type alias using Mediphant's Error type.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================
