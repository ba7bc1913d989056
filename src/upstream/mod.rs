//! Upstream completion provider adapter.
//!
//! All interaction with the external LLM provider goes through the
//! [`CompletionClient`] trait so request handlers stay ignorant of the
//! provider's wire protocol and tests can substitute a fake.

pub mod openai;
pub mod sse;
pub mod types;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::proxy::types::AskRequest;

pub use openai::OpenAiClient;

/// Lazy, non-restartable sequence of chunks from a streaming completion.
///
/// A terminal `Err` item ends the sequence; chunks already yielded stay valid.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, UpstreamError>> + Send>>;

/// One unit of a streamed answer, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamChunk {
    /// An incremental text fragment.
    Content { content: String },
    /// Terminal signal carrying the provider's finish reason.
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: String,
    },
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        StreamChunk::Content {
            content: text.into(),
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        StreamChunk::Finish {
            finish_reason: reason.into(),
        }
    }
}

/// Result of a blocking (non-streaming) completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub response_text: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: Option<String>,
}

/// Failures talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to reach provider: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Provider stream ended without a finish reason")]
    Truncated,
}

/// The three operations the handlers need from a completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Lightweight capability query. Any failure is reported as `false`.
    async fn check_connection(&self) -> bool;

    /// Open a streaming completion. Nothing is sent until the stream is polled.
    fn generate_streaming(&self, request: &AskRequest) -> ChunkStream;

    /// Run a blocking completion and return the whole answer.
    async fn generate_complete(&self, request: &AskRequest) -> Result<Completion, UpstreamError>;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;
}
