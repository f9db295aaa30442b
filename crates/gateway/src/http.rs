//! HTTP surface (spec §6): axum routes over the orchestrator, public
//! health/readiness probes, bearer-auth-gated chat/tools/trust routes,
//! and the CORS layer. Grounded on the teacher's `api::{mod,tools}` —
//! `State`/`Json` extractors, `impl IntoResponse`, JSON error bodies.

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use warden_domain::config::CorsConfig;
use warden_domain::error::Error;
use warden_domain::model::TraceId;

use crate::auth;
use crate::orchestrator::{self, ApproveRequest, ChatRequest, ExecuteRequest};
use crate::state::AppState;

const AI_GENERATED_HEADER: &str = "X-AI-Generated";

pub fn router(state: AppState) -> Router {
    let max_request_bytes = state.config.server.max_request_bytes;

    let public = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let chat_and_tools = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/tools/approve", post(tools_approve))
        .route("/v1/tools/execute", post(tools_execute))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_token));

    let trust = Router::new()
        .route("/v1/trust/events", get(trust_events))
        .route("/v1/trust/trace/:id", get(trust_trace))
        .route("/v1/trust/verify/:id", get(trust_verify))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin_token));

    public
        .merge(chat_and_tools)
        .merge(trust)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Rejects request bodies over `server.max_request_bytes` before any
        // handler (and before Json deserializes the body) runs (spec §5).
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    // The store is reachable iff open_trace/close_trace round-trips.
    let trace_check = state.ledger.open_trace(None).and_then(|id| state.ledger.close_trace(id));
    match trace_check {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "error": e.kind() })),
        ),
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        Error::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        Error::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        Error::PolicyDenied(_) => StatusCode::FORBIDDEN,
        Error::ApprovalRequired(_) => StatusCode::FORBIDDEN,
        Error::ToolNotFound(_) => StatusCode::NOT_FOUND,
        Error::NoMatch | Error::AmbiguousIntent => StatusCode::UNPROCESSABLE_ENTITY,
        Error::HitlPending(_) => StatusCode::ACCEPTED,
        Error::SandboxUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::SandboxExecutionError(_) | Error::HandlerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::NetworkDisabled => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Network(_) | Error::Protocol(_) => StatusCode::BAD_GATEWAY,
        Error::ModelRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        Error::TraceBackendError(_) | Error::ApprovalBackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Scrubs the error message before it crosses the HTTP boundary (spec
/// §7's "secret-like substrings are scrubbed from all error messages").
fn error_body(err: &Error) -> serde_json::Value {
    let message = warden_domain::redaction::scrub_string(
        &err.to_string(),
        warden_domain::redaction::DEFAULT_REDACTION_CAP,
    );
    serde_json::json!({ "error": err.kind(), "message": message })
}

fn with_trace_header(trace_id: TraceId, mut response: axum::response::Response) -> axum::response::Response {
    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert("trace-id", value);
    }
    response.headers_mut().insert(AI_GENERATED_HEADER, HeaderValue::from_static("true"));
    response
}

async fn chat_completions(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> axum::response::Response {
    let (trace_id, result) = orchestrator::handle_chat(&state, req).await;
    let response = match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => (status_for(&e), Json(error_body(&e))).into_response(),
    };
    with_trace_header(trace_id, response)
}

async fn tools_approve(State(state): State<AppState>, Json(req): Json<ApproveRequest>) -> impl IntoResponse {
    match orchestrator::handle_approve(&state, req) {
        Ok(approval) => (StatusCode::OK, Json(approval)).into_response(),
        Err(e) => (status_for(&e), Json(error_body(&e))).into_response(),
    }
}

/// Matches the execute-rejection schema (spec §6): `{status:"error",
/// tool, error:"approval_required", approval_reason}`.
async fn tools_execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> axum::response::Response {
    let tool = req.name.clone();
    let (trace_id, result) = orchestrator::handle_execute(&state, req).await;
    let response = match result {
        Ok(response) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "tool": response.tool, "result": response.result })),
        )
            .into_response(),
        Err(Error::ApprovalRequired(reason)) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "status": "error",
                "tool": tool,
                "error": "approval_required",
                "approval_reason": reason.to_string(),
            })),
        )
            .into_response(),
        Err(e) => (
            status_for(&e),
            Json(serde_json::json!({ "status": "error", "tool": tool, "error": e.kind() })),
        )
            .into_response(),
    };
    with_trace_header(trace_id, response)
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default = "default_events_limit")]
    limit: u32,
}

fn default_events_limit() -> u32 {
    50
}

async fn trust_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    match state.ledger.recent_steps(query.limit, state.config.trace.redaction_cap) {
        Ok(steps) => (StatusCode::OK, Json(serde_json::json!({ "steps": steps }))).into_response(),
        Err(e) => (status_for(&e), Json(error_body(&e))).into_response(),
    }
}

async fn trust_trace(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(trace_id) = id.parse::<TraceId>() else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "malformed_request" }))).into_response();
    };
    match state.ledger.read_steps(trace_id, state.config.trace.redaction_cap) {
        Ok(steps) => (StatusCode::OK, Json(serde_json::json!({ "trace_id": trace_id, "steps": steps }))).into_response(),
        Err(e) => (status_for(&e), Json(error_body(&e))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    expected_hash: Option<String>,
}

async fn trust_verify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    let Ok(trace_id) = id.parse::<TraceId>() else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "malformed_request" }))).into_response();
    };
    match state.ledger.verify_chain(trace_id, query.expected_hash.as_deref()) {
        Ok(verification) => (StatusCode::OK, Json(verification)).into_response(),
        Err(e) => (status_for(&e), Json(error_body(&e))).into_response(),
    }
}

/// Builds a [`CorsLayer`] from the configured allowed origins. Grounded
/// on the teacher's `main.rs::build_cors_layer`: a literal `"*"` origin
/// gets fully permissive (credential-free) CORS; otherwise exact origins
/// and `:*`-port-wildcard origins are both honored, with the wildcard
/// branch validating the remainder is digits-only to block prefix
/// bypass (e.g. `http://localhost:3000.evil.com`).
pub fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
