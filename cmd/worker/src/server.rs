//! HTTP surface of the worker.
//!
//! API endpoints:
//! - GET  /ping        - model load status
//! - POST /invocations - run one task; `Content-Type` and `Accept` must be JSON

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use gen3d_inference::{Correlation, Dispatcher, TaskError, TaskResult, hooks};
use gen3d_models::{Device, ModelStatus};
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    /// `ok` when every model loaded, `degraded` otherwise.
    status: &'static str,
    device: Device,
    models: Vec<ModelStatus>,
}

/// Builds the router serving `dispatcher`.
pub fn router(dispatcher: Dispatcher) -> Router {
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
    };
    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations))
        .with_state(state)
}

/// Serves `dispatcher` on `addr` until Ctrl+C.
pub async fn start_server(addr: &str, dispatcher: Dispatcher) -> Result<()> {
    let app = router(dispatcher);
    let addr = parse_addr(addr)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("worker listening on http://{}", addr);
    info!("  - GET  /ping         model status");
    info!("  - POST /invocations  run a task");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Parse address string to SocketAddr.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}

async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.dispatcher.models();
    let statuses = models.status();
    let status = if statuses.iter().all(|s| s.loaded) {
        "ok"
    } else {
        "degraded"
    };
    Json(PingResponse {
        status,
        device: models.device(),
        models: statuses,
    })
}

async fn invocations(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = header_str(&headers, header::CONTENT_TYPE).unwrap_or_default();
    let accept = header_str(&headers, header::ACCEPT).unwrap_or_default();

    if !accepts_json(accept) {
        let err = TaskError::UnsupportedContentType(accept.to_string());
        return error_response(StatusCode::NOT_ACCEPTABLE, &err);
    }

    let envelope = match hooks::deserialize(&body, content_type) {
        Ok(envelope) => envelope,
        Err(e @ TaskError::UnsupportedContentType(_)) => {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, &e);
        }
        Err(e) => {
            let result = TaskResult::failed(None, &Correlation::default(), None, &e);
            return result_response(&result);
        }
    };

    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(&envelope)).await {
        Ok(result) => result_response(&result),
        Err(e) => {
            error!("dispatch task failed: {e}");
            let err = TaskError::Panicked(e.to_string());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err)
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// True if an `Accept` header admits a JSON response. An absent header
/// accepts anything.
fn accepts_json(accept: &str) -> bool {
    if accept.trim().is_empty() {
        return true;
    }
    accept.split(',').any(|item| {
        let media = item.split(';').next().unwrap_or_default().trim();
        media == "*/*" || media.eq_ignore_ascii_case("application/*") || hooks::is_json(media)
    })
}

fn result_response(result: &TaskResult) -> Response {
    match hooks::serialize(result, hooks::JSON) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, hooks::JSON)], body).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

fn error_response(status: StatusCode, err: &TaskError) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": err.to_string(),
            "error_kind": err.kind(),
        })),
    )
        .into_response()
}
