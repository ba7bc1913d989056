//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::{handlers, logs};
use crate::config::{Config, CorsConfig};
use crate::storage::{metadata, LogBuffer};
use crate::upstream::{CompletionClient, OpenAiClient};

/// Response header carrying the request's correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    pub logs: Arc<LogBuffer>,
}

/// Correlation ID assigned to every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attach a fresh [`RequestId`] to the request extensions and echo it in
/// the response headers.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// CORS for browser front-ends: a static origin allow-list with credentials.
///
/// Methods and headers are mirrored from the request since wildcards are not
/// permitted together with credentials.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/ask", post(handlers::ask))
        .route("/status", get(handlers::status))
        .route("/logs", get(logs::logs_handler))
        .route("/", get(handlers::root))
        .route("/docs", get(handlers::docs))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(assign_request_id))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors)),
        )
}

/// Run the HTTP server until Ctrl-C.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen_addr();

    let client = OpenAiClient::new(&config.openai)?;
    let logs = Arc::new(LogBuffer::new(config.logging.buffer_capacity));

    let state = AppState {
        client: Arc::new(client),
        logs: logs.clone(),
    };

    let app = create_router(state, &config.cors);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        model = %config.openai.model,
        "Starting OpenAI orchestration API"
    );
    logs.info(
        "Service started",
        Some(metadata([
            ("address", serde_json::json!(listen_addr)),
            ("model", serde_json::json!(config.openai.model)),
        ])),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down OpenAI orchestration API");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
