//! The JSON contract of the query entry point.
//!
//! The web and mobile clients send a single `q` parameter and read either
//! `{"answer": ..., "matches": [...]}` or `{"error": ...}`. [`respond`]
//! produces that body together with the status code an HTTP layer should
//! return, so the transport itself stays a thin wrapper.

use serde::{Deserialize, Serialize};

use crate::error::{FaqError, INTERNAL_ERROR_MESSAGE};
use crate::pipeline::{FaqPipeline, FaqResult};

/// Message returned when `q` is missing or blank.
pub const MISSING_QUERY_MESSAGE: &str = "Query parameter \"q\" is required.";

/// Error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message, safe to show to end users.
    pub error: String,
}

/// Body of a reply: the answer, or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FaqResponse {
    /// Successful answer.
    Answer(FaqResult),
    /// Failure.
    Error(ErrorBody),
}

/// Status code and body for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: FaqResponse,
}

impl ApiReply {
    fn ok(result: FaqResult) -> Self {
        Self {
            status: 200,
            body: FaqResponse::Answer(result),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: FaqResponse::Error(ErrorBody {
                error: message.into(),
            }),
        }
    }

    /// True for 2xx replies.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serialize the body.
    pub fn to_json(&self) -> mediphant_core::Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}

/// Answer the `q` parameter of a request.
///
/// Missing or blank `q` is a 400 with a fixed message. Any failure inside the
/// pipeline is a 500 with the generic internal-error message; the detail has
/// already been logged by the pipeline.
pub async fn respond(pipeline: &FaqPipeline, q: Option<&str>) -> ApiReply {
    let Some(question) = q.filter(|q| !q.trim().is_empty()) else {
        return ApiReply::error(400, MISSING_QUERY_MESSAGE);
    };

    match pipeline.answer(question).await {
        Ok(result) => ApiReply::ok(result),
        Err(FaqError::InvalidInput(_)) => ApiReply::error(400, MISSING_QUERY_MESSAGE),
        Err(FaqError::Internal(_)) => ApiReply::error(500, INTERNAL_ERROR_MESSAGE),
    }
}
