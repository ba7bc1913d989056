//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::server::{AppState, RequestId};
use super::stream::relay;
use super::types::{AskRequest, AskResponse, ServiceStatus, StatusResponse};
use crate::error::Error;
use crate::storage::metadata;

/// Service name reported by the root endpoint.
pub const SERVICE_NAME: &str = "OpenAI Orchestration API";
/// Version reported by `/` and `/status`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handle POST /ask
pub async fn ask(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let request_id = request_id.to_string();

    let request = match payload.map_err(Error::from).and_then(|Json(request)| {
        request.validate()?;
        Ok(request)
    }) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected ask request");
            state.logs.warning(
                format!("Rejected ask request: {}", e),
                Some(metadata([("request_id", json!(request_id))])),
            );
            return Err(e);
        }
    };

    tracing::info!(
        request_id = %request_id,
        stream = request.stream,
        temperature = request.temperature,
        max_tokens = request.max_tokens,
        model = %state.client.model(),
        "Received ask request"
    );
    state.logs.info(
        "Ask request received",
        Some(metadata([
            ("request_id", json!(request_id)),
            ("stream", json!(request.stream)),
            ("prompt_preview", json!(request.prompt_preview())),
            ("temperature", json!(request.temperature)),
            ("max_tokens", json!(request.max_tokens)),
        ])),
    );

    if request.stream {
        let chunks = state.client.generate_streaming(&request);
        let body = Body::from_stream(relay(chunks, state.logs.clone(), request_id));

        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            body,
        )
            .into_response());
    }

    match state.client.generate_complete(&request).await {
        Ok(completion) => {
            tracing::info!(
                request_id = %request_id,
                tokens_used = ?completion.tokens_used,
                finish_reason = ?completion.finish_reason,
                "Completion finished"
            );
            state.logs.info(
                "Completion finished",
                Some(metadata([
                    ("request_id", json!(request_id)),
                    ("tokens_used", json!(completion.tokens_used)),
                    ("finish_reason", json!(completion.finish_reason)),
                ])),
            );

            Ok(Json(AskResponse {
                response: completion.response_text,
                tokens_used: completion.tokens_used,
                finish_reason: completion.finish_reason,
            })
            .into_response())
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Error in /ask");
            state.logs.error(
                format!("Error in /ask: {}", e),
                Some(metadata([("request_id", json!(request_id))])),
            );
            Err(Error::Upstream(e))
        }
    }
}

/// Handle GET /status
///
/// Always 200: an unreachable provider is reported in the body.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connected = state.client.check_connection().await;

    let status = if connected {
        ServiceStatus::Running
    } else {
        tracing::warn!(model = %state.client.model(), "Provider unreachable");
        state.logs.warning(
            "Status check: provider unreachable",
            Some(metadata([("model", json!(state.client.model()))])),
        );
        ServiceStatus::Error
    };

    Json(StatusResponse {
        status,
        version: VERSION.to_string(),
        openai_connected: connected,
    })
}

/// Handle GET /
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": SERVICE_NAME,
        "version": VERSION,
        "docs": "/docs",
    }))
}

/// Handle GET /docs - catalog of the HTTP surface
pub async fn docs() -> impl IntoResponse {
    Json(json!({
        "title": SERVICE_NAME,
        "version": VERSION,
        "routes": [
            {
                "method": "POST",
                "path": "/ask",
                "description": "Send a prompt; streams SSE frames unless \"stream\" is false",
            },
            {
                "method": "GET",
                "path": "/status",
                "description": "Service status and provider connectivity",
            },
            {
                "method": "GET",
                "path": "/logs",
                "description": "Recent log entries; query: limit (1-1000), level",
            },
            {
                "method": "GET",
                "path": "/",
                "description": "Service information",
            },
        ],
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> Error {
    Error::NotFound
}
