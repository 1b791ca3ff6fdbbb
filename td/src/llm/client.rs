//! `LlmClient` - the collaborator trait every provider implements.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// A large-language-model provider client.
///
/// Implementors are the sole place network I/O to an LLM happens; every
/// other module only ever talks to `dyn LlmClient`, never to a concrete
/// provider, so tests substitute `mock::MockLlmClient`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a single, non-streaming completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Run a completion, forwarding incremental chunks on `chunk_tx` as
    /// they arrive, still returning the assembled final response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}

/// A scripted `LlmClient` for tests: returns one queued response per call,
/// in order, erroring once the queue is exhausted.
pub mod mock {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::LlmClient;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

    pub struct MockLlmClient {
        responses: Mutex<Vec<CompletionResponse>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        /// Queue of responses returned in FIFO order, one per `complete` call.
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Every request `complete`/`stream` has been called with, in order.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("MockLlmClient: response queue exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            _chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            self.complete(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockLlmClient;
    use super::*;
    use crate::llm::{Message, StopReason, TokenUsage, ToolChoice};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "test".to_string(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 10,
            tool_choice: ToolChoice::Auto,
        }
    }

    fn response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    #[tokio::test]
    async fn mock_returns_queued_responses_in_order() {
        let mock = MockLlmClient::new(vec![response("first"), response("second")]);
        let first = mock.complete(request()).await.unwrap();
        let second = mock.complete(request()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));
        assert_eq!(second.content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn mock_errors_when_queue_exhausted() {
        let mock = MockLlmClient::new(vec![]);
        assert!(mock.complete(request()).await.is_err());
    }

    #[tokio::test]
    async fn mock_records_requests() {
        let mock = MockLlmClient::new(vec![response("ok")]);
        mock.complete(request()).await.unwrap();
        assert_eq!(mock.requests().len(), 1);
    }
}
