//! Shared error taxonomy used across all warden crates.
//!
//! Variants map onto the logical error kinds of the control plane (request,
//! routing, execution, provider, and system errors). The taxonomy is a
//! closed Rust enum rather than a string tag so call sites match on it
//! exhaustively and the HTTP layer can map each variant to a status code.

/// Reasons an approval was rejected (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRejection {
    MissingApproval,
    UnknownApproval,
    AlreadyConsumed,
    ToolMismatch,
    ArgsHashMismatch,
    Expired,
}

impl std::fmt::Display for ApprovalRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingApproval => "missing_approval",
            Self::UnknownApproval => "unknown_approval",
            Self::AlreadyConsumed => "already_consumed",
            Self::ToolMismatch => "tool_mismatch",
            Self::ArgsHashMismatch => "args_hash_mismatch",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // ── Request errors (4xx-class) ─────────────────────────────────
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("request too large")]
    RequestTooLarge,
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error("approval required: {0}")]
    ApprovalRequired(ApprovalRejection),
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    // ── Routing errors ──────────────────────────────────────────────
    #[error("no matching intent")]
    NoMatch,
    #[error("ambiguous intent")]
    AmbiguousIntent,
    #[error("human review pending: {0}")]
    HitlPending(String),

    // ── Execution errors ────────────────────────────────────────────
    #[error("sandbox unavailable")]
    SandboxUnavailable,
    #[error("sandbox execution error: {0}")]
    SandboxExecutionError(String),
    #[error("handler error: {0}")]
    HandlerError(String),

    // ── Provider errors ─────────────────────────────────────────────
    #[error("network disabled")]
    NetworkDisabled,
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network: {0}")]
    Network(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("model rejected: {0}")]
    ModelRejected(String),
    #[error("circuit open")]
    CircuitOpen,

    // ── System errors (5xx-class) ───────────────────────────────────
    #[error("trace backend error: {0}")]
    TraceBackendError(String),
    #[error("approval backend error: {0}")]
    ApprovalBackendError(String),
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,

    // ── Ambient ──────────────────────────────────────────────────────
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The logical error kind used in the `error` field of HTTP responses,
    /// trace step payloads, and log events (spec §7's taxonomy names).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::RequestTooLarge => "request_too_large",
            Self::MalformedRequest(_) => "malformed_request",
            Self::PolicyDenied(_) => "policy_denied",
            Self::ApprovalRequired(_) => "approval_required",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::NoMatch => "no_match",
            Self::AmbiguousIntent => "ambiguous_intent",
            Self::HitlPending(_) => "hitl_pending",
            Self::SandboxUnavailable => "sandbox_unavailable",
            Self::SandboxExecutionError(_) => "sandbox_execution_error",
            Self::HandlerError(_) => "handler_error",
            Self::NetworkDisabled => "network_disabled",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Protocol(_) => "protocol",
            Self::ModelRejected(_) => "model_rejected",
            Self::CircuitOpen => "circuit_open",
            Self::TraceBackendError(_) => "trace_backend_error",
            Self::ApprovalBackendError(_) => "approval_backend_error",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
