//! LLM provider abstraction
//!
//! A streaming interface over the model endpoint. Gemini is the only
//! provider; tests substitute their own implementation.

mod error;
mod gemini;
mod stream;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use gemini::{GeminiService, DEFAULT_MODEL};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Start a streaming completion
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    /// Make a completion request, waiting for the whole reply
    #[cfg(test)]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let stream = self.stream(request).await?;
        collect_stream(stream).await
    }

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let start = Instant::now();
        let model = self.model_id.clone();

        let stream = match self.inner.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
                return Err(e);
            }
        };

        let mut usage = Usage::default();
        let logged = stream.inspect(move |chunk| match chunk {
            Ok(StreamChunk::Usage(latest)) => usage = *latest,
            Ok(StreamChunk::Finish { reason }) => {
                tracing::info!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    finish_reason = %reason,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM stream failed"
                );
            }
            Ok(_) => {}
        });

        Ok(Box::pin(logged))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
