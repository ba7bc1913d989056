//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::error::Error;

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_stream() -> bool {
    true
}

/// Body of `POST /ask`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens", alias = "maxtokens", alias = "max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl AskRequest {
    /// Validate at ingress, before any upstream call is made.
    pub fn validate(&self) -> Result<(), Error> {
        if self.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Validation(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(Error::Validation(
                "maxTokens must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// First 50 characters of the prompt, for log entries.
    pub fn prompt_preview(&self) -> String {
        self.prompt.chars().take(50).collect()
    }
}

/// Body of a non-streaming `POST /ask` response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Service status as reported by `GET /status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Error,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: ServiceStatus,
    pub version: String,
    pub openai_connected: bool,
}

/// Query parameters of `GET /logs`.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub level: Option<String>,
}
