//! Model interaction: send the prompt and the receipt image, get text back.
//!
//! The model sits behind the [`VisionModel`] trait so the pipeline never
//! depends on a concrete provider. [`ProviderModel`] adapts any
//! `edgequake_llm` provider; tests and embedders inject their own.
//!
//! ## Timeout and retry
//!
//! The external model has unbounded latency, so every call is wrapped in
//! `api_timeout_secs`. A transport failure ([`ReceiptError::Upstream`]) is
//! retried once after `retry_backoff_ms` when `max_retries` allows it.
//! Nothing else is retried: a timeout has already spent the caller's
//! budget, and a parse failure is deterministic for the same text.

use crate::config::ExtractionConfig;
use crate::error::ReceiptError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Raw text returned by the model, with token accounting when available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ModelReply {
    /// A reply with only text (no token accounting).
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A capability mapping (instructions, image) → text.
///
/// No JSON well-formedness is guaranteed by implementors; recovery happens
/// downstream in [`crate::pipeline::recover`].
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run one completion. Transport failures must be reported as
    /// [`ReceiptError::Upstream`] so the retry policy can recognise them.
    async fn complete(&self, prompt: &str, image: ImageData) -> Result<ModelReply, ReceiptError>;
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl VisionModel for ProviderModel {
    async fn complete(&self, prompt: &str, image: ImageData) -> Result<ModelReply, ReceiptError> {
        // One user turn: the instructions and the image travel together.
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ReceiptError::Upstream {
                message: format!("{}", e),
            })?;

        Ok(ModelReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}

/// Call the model once, bounded by the configured timeout, retrying a
/// transport failure at most `config.max_retries` times.
pub async fn request_extraction(
    model: &dyn VisionModel,
    prompt: &str,
    image: ImageData,
    config: &ExtractionConfig,
) -> Result<ModelReply, ReceiptError> {
    let start = Instant::now();
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let outcome = match timeout(limit, model.complete(prompt, image.clone())).await {
            Ok(result) => result,
            Err(_) => Err(ReceiptError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(reply) => {
                debug!(
                    "Model replied: {} input tokens, {} output tokens, {} chars, {:?}",
                    reply.prompt_tokens,
                    reply.completion_tokens,
                    reply.content.len(),
                    start.elapsed()
                );
                return Ok(reply);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    "Model call failed ({}); retry {}/{} after {}ms",
                    e, attempt, config.max_retries, config.retry_backoff_ms
                );
                sleep(Duration::from_millis(config.retry_backoff_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
