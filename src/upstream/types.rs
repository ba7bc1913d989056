//! OpenAI-compatible chat-completions wire types.

use serde::{Deserialize, Serialize};

/// Chat completion request sent upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion response (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

/// A completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// Assistant message in a completion choice. `content` may be null.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Streaming chunk. Providers may send an `error` object in place of choices.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    pub error: Option<ErrorBody>,
}

/// A streaming choice delta.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

/// Provider error payload (`{"error": {"message": ...}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Model listing response used for connectivity checks.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_single_user_message() {
        let req = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("Hello")],
            temperature: 0.7,
            max_tokens: 50,
            stream: false,
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["max_tokens"], 50);
        assert_eq!(json["stream"], false);
        assert_eq!(json["temperature"], 0.7);
    }

    #[test]
    fn response_with_null_content_parses() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 0, "total_tokens": 3}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert_eq!(
            parsed.choices[0].finish_reason.as_deref(),
            Some("content_filter")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn usage_only_chunk_parses_with_empty_choices() {
        let raw = r#"{"id":"abc","choices":[],"usage":{"prompt_tokens":6,"completion_tokens":10,"total_tokens":16}}"#;
        let parsed: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn role_only_delta_parses() {
        let raw = r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        let parsed: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
        assert!(parsed.choices[0].finish_reason.is_none());
    }
}
