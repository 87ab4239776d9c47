//! Mock LLM provider for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediphant_core::{Error, Result};
use tokio::sync::Mutex;

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, StopReason, TokenUsage};

/// Mock LLM provider that returns canned responses.
///
/// Every request is recorded so tests can inspect the exact prompt the
/// pipeline sent. Clones share the same responses and recorded requests.
#[derive(Clone)]
pub struct MockLlmProvider {
    state: Arc<Mutex<MockState>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

struct MockState {
    canned: Vec<String>,
    index: usize,
    requests: Vec<CompletionRequest>,
}

impl MockLlmProvider {
    /// Creates a new mock provider with canned responses.
    ///
    /// Responses are returned in order. After all responses are used,
    /// the provider cycles back to the first response. With no responses
    /// the provider answers with an empty string.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediphant_llm::MockLlmProvider;
    ///
    /// let provider = MockLlmProvider::new(vec![
    ///     "First response".to_string(),
    ///     "Second response".to_string(),
    /// ]);
    /// ```
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                canned: responses,
                index: 0,
                requests: Vec::new(),
            })),
            delay: None,
            failure: None,
        }
    }

    /// Creates a mock provider with a single response.
    pub fn with_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Creates a mock provider whose every call fails with a provider error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.state.lock().await.requests.push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(Error::provider("mock", message.clone()));
        }

        let mut state = self.state.lock().await;
        let content = if state.canned.is_empty() {
            String::new()
        } else {
            let content = state.canned[state.index].clone();
            state.index = (state.index + 1) % state.canned.len();
            content
        };

        Ok(CompletionResponse {
            content,
            tokens_used: TokenUsage {
                input: 10, // Mock values
                output: 20,
            },
            stop_reason: StopReason::EndTurn,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-llm"
    }
}
