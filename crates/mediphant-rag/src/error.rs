//! Caller-facing errors of the FAQ pipeline.

use mediphant_core::Error;
use thiserror::Error as ThisError;

/// Generic message returned for every failure that is not the caller's fault.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

/// What a caller of [`FaqPipeline::answer`](crate::FaqPipeline::answer) can
/// observe.
///
/// Only the question check produces `InvalidInput`. Everything after it is
/// `Internal`, even an `InvalidInput` raised by a provider, and displays only
/// the generic message. The underlying error stays reachable through
/// `source()` for logging.
#[derive(Debug, ThisError)]
pub enum FaqError {
    /// The question was empty or otherwise unusable.
    #[error("{0}")]
    InvalidInput(String),

    /// Any provider, store, timeout, or configuration failure.
    #[error("An internal server error occurred.")]
    Internal(#[source] Error),
}

impl FaqError {
    /// True when the caller supplied bad input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// The underlying error of an `Internal` failure.
    pub fn internal(&self) -> Option<&Error> {
        match self {
            Self::Internal(e) => Some(e),
            Self::InvalidInput(_) => None,
        }
    }
}
