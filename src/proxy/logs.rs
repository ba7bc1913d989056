//! Log inspection endpoint.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use super::server::AppState;
use super::types::LogsQuery;
use crate::error::Error;
use crate::storage::{metadata, LogEntry};

/// Entries returned when `limit` is not given.
pub const DEFAULT_LIMIT: usize = 100;
/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 1000;

/// Handle GET /logs
///
/// Returns up to `limit` of the most recent entries, oldest first, optionally
/// filtered by level. Reading the buffer never fails the request.
pub async fn logs_handler(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, Error> {
    let (limit, level) = match parse_query(query) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected logs query");
            state.logs.warning(
                format!("Rejected logs query: {}", e),
                Some(metadata([("endpoint", serde_json::json!("/logs"))])),
            );
            return Err(e);
        }
    };

    tracing::debug!(limit, level = ?level, "Logs query");

    Ok(Json(state.logs.query(limit, level.as_deref())))
}

fn parse_query(
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<(usize, Option<String>), Error> {
    let Query(params) = query?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_LIMIT, limit
        )));
    }
    Ok((limit, params.level))
}
