//! Bearer-token auth middleware, applied to every protected route.
//!
//! Grounded on the teacher's `api::auth::require_api_token`: the token is
//! read once at startup (see `main.rs`), hashed, and stored in `AppState`;
//! `None` means auth is disabled (dev mode). Comparison happens in
//! constant time via `subtle` so a timing side-channel can't leak the
//! token byte by byte.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "unauthorized" })),
    )
        .into_response()
}

fn provided_token(req: &Request<Body>) -> &str {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.api_token_hash else {
        // No token configured: auth disabled (dev mode).
        return next.run(req).await;
    };

    let provided_hash = Sha256::digest(provided_token(&req).as_bytes());
    if provided_hash.as_slice().ct_eq(expected_hash).into() {
        next.run(req).await
    } else {
        unauthorized()
    }
}

/// Gate on the admin token instead, for the `/v1/trust/*` endpoints —
/// audit data deserves a separate, more tightly held credential than the
/// one handed to ordinary chat/tool clients.
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.admin_token_hash else {
        return next.run(req).await;
    };

    let provided_hash = Sha256::digest(provided_token(&req).as_bytes());
    if provided_hash.as_slice().ct_eq(expected_hash).into() {
        next.run(req).await
    } else {
        unauthorized()
    }
}
