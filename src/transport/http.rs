//! HTTP surface for submitting and polling requests
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/messages` | submit (`x-ms-conversation-id` header required) |
//! | GET | `/messages` | list, optional `?offset=&limit=` |
//! | GET | `/messages/{id}/status` | current status |
//! | GET | `/messages/{id}/updates` | every update so far |
//! | GET | `/health` | liveness and uptime |
//! | GET | `/metrics` | metrics snapshot |

use crate::agent::domain::CONVERSATION_ID_HEADER;
use crate::error::{SemkerError, SemkerResult};
use crate::observability::metrics::metrics;
use crate::processing::ProcessingScheduler;
use crate::protocol::SubmitBody;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// State shared by every route
#[derive(Clone)]
pub struct ApiState {
    scheduler: Arc<ProcessingScheduler>,
    started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(scheduler: Arc<ProcessingScheduler>) -> Self {
        Self {
            scheduler,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
    uptime_seconds: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: DateTime<Utc>,
}

/// Build the complete route tree
pub fn routes(state: ApiState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let submit = warp::path!("messages")
        .and(warp::post())
        .and(warp::header::optional::<String>(CONVERSATION_ID_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<SubmitBody>())
        .and(with_state.clone())
        .and_then(submit_message);

    let list = warp::path!("messages")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_state.clone())
        .and_then(list_messages);

    let status = warp::path!("messages" / String / "status")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(message_status);

    let updates = warp::path!("messages" / String / "updates")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(message_updates);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state)
        .and_then(health_check);

    let metrics_route = warp::path!("metrics").and(warp::get()).and_then(metrics_export);

    submit
        .or(list)
        .or(status)
        .or(updates)
        .or(health)
        .or(metrics_route)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// Serve `routes` on `addr` until `shutdown` resolves
pub async fn serve<F>(state: ApiState, addr: SocketAddr, shutdown: F) -> SemkerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| SemkerError::internal(format!("Cannot bind {addr}: {e}")))?;

    info!(address = %bound, "HTTP server listening");
    server.await;
    info!("HTTP server stopped");
    Ok(())
}

async fn submit_message(
    conversation_id: Option<String>,
    body: SubmitBody,
    state: ApiState,
) -> Result<WithStatus<Json>, Infallible> {
    let conversation_id = conversation_id.unwrap_or_default();
    match state.scheduler.submit(&body.message, &conversation_id) {
        Ok(receipt) => Ok(json_with_status(&receipt, StatusCode::CREATED)),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn list_messages(query: ListQuery, state: ApiState) -> Result<WithStatus<Json>, Infallible> {
    let ledger = state.scheduler.ledger();
    let list = match (query.offset, query.limit) {
        (None, None) => ledger.list_all(),
        (offset, limit) => ledger.list_page(offset.unwrap_or(0), limit.unwrap_or(usize::MAX)),
    };
    Ok(json_with_status(&list, StatusCode::OK))
}

async fn message_status(id: String, state: ApiState) -> Result<WithStatus<Json>, Infallible> {
    let result = parse_request_id(&id).and_then(|id| state.scheduler.ledger().get_status(id));
    Ok(match result {
        Ok(view) => json_with_status(&view, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

async fn message_updates(id: String, state: ApiState) -> Result<WithStatus<Json>, Infallible> {
    let result = parse_request_id(&id).and_then(|id| state.scheduler.ledger().get_updates(id));
    Ok(match result {
        Ok(updates) => json_with_status(&updates, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

async fn health_check(state: ApiState) -> Result<WithStatus<Json>, Infallible> {
    let now = Utc::now();
    let uptime = (now - state.started_at).num_milliseconds().max(0) as f64 / 1000.0;
    let response = HealthResponse {
        status: "healthy",
        timestamp: now,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
    };
    Ok(json_with_status(&response, StatusCode::OK))
}

async fn metrics_export() -> Result<WithStatus<Json>, Infallible> {
    Ok(json_with_status(&metrics().get_metrics(), StatusCode::OK))
}

/// Ids that are not UUIDs cannot exist in the ledger
fn parse_request_id(id: &str) -> SemkerResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| {
        debug!(id, "Malformed request id");
        SemkerError::NotFound {
            request_id: Uuid::nil(),
        }
    })
}

fn json_with_status<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_body(message: impl Into<String>, status: StatusCode) -> WithStatus<Json> {
    json_with_status(
        &ErrorResponse {
            error: message.into(),
            timestamp: Utc::now(),
        },
        status,
    )
}

fn error_reply(error: &SemkerError) -> WithStatus<Json> {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match error {
        SemkerError::NotFound { request_id } if request_id.is_nil() => {
            "Message not found".to_string()
        }
        _ if error.is_client_error() => error.to_string(),
        _ => error.public_message(),
    };
    if !error.is_client_error() {
        warn!(error = %error, "Request failed");
    }
    error_body(message, status)
}

async fn handle_rejection(rejection: Rejection) -> Result<WithStatus<Json>, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_string(),
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!(rejection = ?rejection, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };
    Ok(error_body(message, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_id_is_not_found() {
        let err = parse_request_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_internal_errors_are_sanitized() {
        let reply = error_reply(&SemkerError::internal("token=abc123 leaked"));
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
