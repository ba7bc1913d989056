//! OpenAI chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use super::sse::{SseDecoder, DONE_MARKER};
use super::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Message, ModelList,
};
use super::{ChunkStream, Completion, CompletionClient, StreamChunk, UpstreamError};
use crate::config::{ApiKey, OpenAiConfig};
use crate::proxy::types::AskRequest;

/// Bound on the connectivity probe, independent of the completion timeout.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn completion_request(&self, request: &AskRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(request.prompt.clone())],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }

    fn classify(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Network(e)
        }
    }
}

/// Turn a non-2xx response into an `UpstreamError::Status` carrying the body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Interpret one `data:` payload of the provider's stream.
///
/// Content is emitted before the finish reason when a single event carries
/// both. Events without choices (e.g. trailing usage) yield nothing.
fn interpret_event(data: &str) -> Result<Vec<StreamChunk>, UpstreamError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| UpstreamError::InvalidResponse(format!("{}: {}", e, data)))?;

    if let Some(error) = chunk.error {
        return Err(UpstreamError::Provider(error.message));
    }

    let mut out = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(StreamChunk::content(content));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk::finish(reason));
        }
    }
    Ok(out)
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn check_connection(&self) -> bool {
        let result = self
            .http
            .get(self.url("models"))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(CHECK_TIMEOUT)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reach provider");
                return false;
            }
        };

        match ensure_success(response).await {
            Ok(response) => {
                match response.json::<ModelList>().await {
                    Ok(models) => {
                        tracing::debug!(models = models.data.len(), "Provider reachable")
                    }
                    Err(e) => tracing::debug!(error = %e, "Provider reachable, model list unreadable"),
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Provider connectivity check failed");
                false
            }
        }
    }

    fn generate_streaming(&self, request: &AskRequest) -> ChunkStream {
        let client = self.clone();
        let body = self.completion_request(request, true);

        Box::pin(async_stream::try_stream! {
            // The whole-request timeout would cut long answers short, so only
            // the initial response and each idle gap between chunks are bounded.
            let send = client
                .http
                .post(client.url("chat/completions"))
                .bearer_auth(client.api_key.expose_secret())
                .json(&body)
                .send();
            let response = tokio::time::timeout(client.timeout, send)
                .await
                .map_err(|_| UpstreamError::Timeout(client.timeout))?
                .map_err(|e| client.classify(e))?;
            let response = ensure_success(response).await?;

            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut finished = false;
            let mut done = false;

            while !done {
                let next = tokio::time::timeout(client.timeout, bytes.next())
                    .await
                    .map_err(|_| UpstreamError::Timeout(client.timeout))?;

                let payloads = match next {
                    Some(chunk) => decoder.push(&chunk.map_err(|e| client.classify(e))?)?,
                    None => {
                        done = true;
                        std::mem::take(&mut decoder).finish()?.into_iter().collect()
                    }
                };

                for data in payloads {
                    if data.trim() == DONE_MARKER {
                        done = true;
                        break;
                    }
                    for chunk in interpret_event(&data)? {
                        match chunk {
                            StreamChunk::Finish { .. } if finished => {}
                            StreamChunk::Finish { .. } => {
                                finished = true;
                                yield chunk;
                            }
                            content => {
                                yield content;
                            }
                        }
                    }
                }
            }

            if !finished {
                Err(UpstreamError::Truncated)?;
            }
        })
    }

    async fn generate_complete(&self, request: &AskRequest) -> Result<Completion, UpstreamError> {
        let body = self.completion_request(request, false);

        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response = ensure_success(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::InvalidResponse("response has no choices".to_string()))?;

        Ok(Completion {
            response_text: choice.message.content.unwrap_or_default(),
            tokens_used: parsed.usage.map(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
