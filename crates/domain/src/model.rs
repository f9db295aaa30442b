//! Core data model shared by every component (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(TraceId);
uuid_id!(ApprovalId);
uuid_id!(HitlRequestId);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace Ledger (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub created_at: DateTime<Utc>,
    pub parent: Option<TraceId>,
    pub status: TraceStatus,
}

/// The tag of a [`TraceStep`]. A closed set so every trace step is
/// discriminated at compile time rather than by a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    RequestReceived,
    IntentRouter,
    IntentRouterShadow,
    PolicyDecision,
    ApprovalChecked,
    ToolExecute,
    ProviderCall,
    ResponseSent,
    Cancelled,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        f.write_str(&s)
    }
}

/// A single immutable, chain-hashed entry in a trace (spec §3/§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub trace_id: TraceId,
    pub position: u64,
    pub step_type: StepType,
    pub created_at: DateTime<Utc>,
    pub sanitized_payload: serde_json::Value,
    pub event_hash: String,
    pub chain_hash: String,
}

/// Result of [`crate` ledger's] `verify_chain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub trace_id: TraceId,
    pub computed_hash: String,
    pub ok: Option<bool>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval Store (C4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Consumed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub approval_id: ApprovalId,
    pub tool_name: String,
    pub args_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy Engine (C2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
}

/// Conditions that gate whether a matched rule actually applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConditions {
    /// Name of the argument this rule's length condition applies to.
    #[serde(default)]
    pub input_param: Option<String>,
    /// Maximum permitted length (in characters) for `input_param`'s value.
    #[serde(default)]
    pub max_input_len: Option<usize>,
    /// Flags that must all be present in the request's flag set.
    #[serde(default)]
    pub required_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Regex matched against the tool name.
    pub match_pattern: String,
    pub action: PolicyAction,
    pub reason: String,
    #[serde(default)]
    pub conditions: PolicyConditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allow: bool,
    pub reason: String,
    pub matched_rule_index: Option<usize>,
    pub policy_hash: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent Router (C6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome a Tier-0 rule produces when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Allow,
    Deny,
}

/// An ordered Tier-0 rule: first matching regex wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRule {
    /// Regex matched against the raw user input text.
    pub match_pattern: String,
    pub outcome: RuleOutcome,
    /// Tool bound on `outcome: allow`. Ignored on deny.
    #[serde(default)]
    pub tool: Option<String>,
    pub reason: String,
}

/// A tool the semantic tier may route to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutableTool {
    pub name: String,
    pub description: String,
    /// When true, an ambiguous/ no-match decision against this tool's
    /// candidacy always escalates to HITL rather than `no_match`.
    #[serde(default)]
    pub tier3_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCacheEntry {
    pub policy_hash: String,
    pub signature: String,
    pub tool: String,
    pub params: serde_json::Value,
    pub confidence: f32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlState {
    Queued,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlCandidate {
    pub tool: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlRequest {
    pub hitl_id: HitlRequestId,
    pub trace_id: TraceId,
    pub created_at: DateTime<Utc>,
    pub candidates: Vec<HitlCandidate>,
    pub guard_reason: String,
    pub state: HitlState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTier {
    RuleGate = 0,
    Cache = 1,
    Semantic = 2,
    Hitl = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDecision {
    pub tool: Option<String>,
    pub params: serde_json::Value,
    pub confidence: f32,
    pub gap: f32,
    pub tier_used: IntentTier,
    pub reason: String,
    pub requires_hitl: bool,
    pub policy_hash: String,
    pub hitl_id: Option<HitlRequestId>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool Registry & Executor (C3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSafety {
    Safe,
    Unsafe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub safety: ToolSafety,
    /// JSON-Schema-shaped declaration of accepted parameters.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub status: String,
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
    pub truncated: bool,
    pub sandbox_used: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider Client (C5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub latency_ms: u64,
    pub attempts: u32,
    pub truncated: bool,
}
