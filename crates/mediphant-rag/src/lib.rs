#![doc = include_str!("../README.md")]
//!
//! # Modules
//!
//! - [`prompt`]: grounded prompt template and context assembly
//! - [`pipeline`]: [`FaqPipeline`] and its builder
//! - [`api`]: the `{answer, matches}` / `{error}` JSON contract and [`respond`]
//! - [`error`]: [`FaqError`], the only error a caller of the pipeline sees

pub mod api;
pub mod error;
pub mod pipeline;
pub mod prompt;

pub use api::{ApiReply, ErrorBody, FaqResponse, MISSING_QUERY_MESSAGE, respond};
pub use error::{FaqError, INTERNAL_ERROR_MESSAGE};
pub use pipeline::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_TOKENS, DEFAULT_TOP_K, FaqPipeline, FaqPipelineBuilder,
    FaqResult,
};
pub use prompt::{
    CONTEXT_SEPARATOR, DEFAULT_TEMPLATE, GROUNDING_INSTRUCTION, PromptTemplate, assemble_context,
};
