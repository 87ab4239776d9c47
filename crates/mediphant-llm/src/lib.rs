//! LLM provider abstractions and implementations.
//!
//! The query pipeline talks to a generative model only through
//! [`LlmProvider`], so the backend can be swapped by configuration.

#![doc = include_str!("../README.md")]

mod claude;
mod gemini;
mod mock;
mod provider;

pub use claude::{ClaudeProvider, DEFAULT_CLAUDE_URL};
pub use gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiProvider};
pub use mock::MockLlmProvider;
pub use provider::{
    CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, LlmProvider, StopReason, TokenUsage,
};
