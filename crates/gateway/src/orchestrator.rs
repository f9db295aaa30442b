//! Orchestrator (C7): the straight-line request pipeline that drives the
//! other six components. Each stage returns an explicit `Result` per
//! spec §9's re-architecting note — there is no exception-style control
//! flow here, only early `?`/`return Err` on the first failing stage.

use serde::Serialize;
use serde_json::json;

use warden_domain::error::{ApprovalRejection, Error, Result};
use warden_domain::model::{
    Approval, ApprovalId, ChatMessage, StepType, ToolExecutionResult, ToolSafety, TraceId,
};

use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    pub input: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub approval_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub trace_id: TraceId,
    pub tool: Option<String>,
    pub tier_used: warden_domain::model::IntentTier,
    pub output: serde_json::Value,
}

#[derive(Debug, serde::Deserialize)]
pub struct ApproveRequest {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ExecuteRequest {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub approval_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub trace_id: TraceId,
    pub tool: String,
    pub result: ToolExecutionResult,
}

/// The default provider when a request doesn't name one: unambiguous
/// only when exactly one provider is configured.
fn default_provider_id(state: &AppState) -> Option<String> {
    let mut keys: Vec<&String> = state.config.providers.providers.keys().collect();
    if keys.len() == 1 {
        keys.pop().cloned()
    } else {
        None
    }
}

fn parse_approval_id(raw: &str) -> Result<ApprovalId> {
    raw.parse()
        .map_err(|_| Error::ApprovalRequired(ApprovalRejection::UnknownApproval))
}

/// Validates (and consumes) an approval for an unsafe tool, recording the
/// `approval_checked` step either way. Returns `Ok(())` when no approval
/// was required (safe tool, or enforcement disabled).
fn check_approval(
    state: &AppState,
    trace_id: TraceId,
    tool_name: &str,
    args: &serde_json::Value,
    safety: ToolSafety,
    approval_id: Option<&str>,
) -> Result<()> {
    if safety != ToolSafety::Unsafe || !state.config.approval.enforcement {
        return Ok(());
    }

    let outcome = match approval_id.map(parse_approval_id) {
        None => Err(Error::ApprovalRequired(ApprovalRejection::MissingApproval)),
        Some(Err(e)) => Err(e),
        Some(Ok(id)) => state.approvals.validate_and_consume(id, tool_name, args),
    };

    let logged = match &outcome {
        Ok(()) => "ok".to_string(),
        Err(Error::ApprovalRequired(reason)) => reason.to_string(),
        Err(_) => "error".to_string(),
    };
    state
        .ledger
        .append_step(trace_id, StepType::ApprovalChecked, json!({ "result": logged }))?;

    outcome
}

/// Drives the full chat pipeline (spec §4.7 steps 1-6). Always returns
/// the trace id alongside the outcome so the HTTP layer can stamp the
/// `trace-id` header even on failure.
pub async fn handle_chat(state: &AppState, req: ChatRequest) -> (TraceId, Result<ChatResponse>) {
    let trace_id = match state.ledger.open_trace(None) {
        Ok(id) => id,
        Err(e) => return (TraceId::new(), Err(e)),
    };

    match handle_chat_inner(state, trace_id, req).await {
        Ok(response) => (trace_id, Ok(response)),
        Err(e) => {
            let _ = state.ledger.close_trace(trace_id);
            (trace_id, Err(e))
        }
    }
}

async fn handle_chat_inner(state: &AppState, trace_id: TraceId, req: ChatRequest) -> Result<ChatResponse> {
    // Step 1: request_received, metadata only — never the raw message body.
    state.ledger.append_step(
        trace_id,
        StepType::RequestReceived,
        json!({ "input_chars": req.input.chars().count() }),
    )?;

    // Step 2: Intent Router.
    let policy_hash = state.policy.policy_hash();
    let decision = state.router.route(trace_id, &req.input, &policy_hash)?;
    let step_type = if state.config.router.shadow_mode {
        StepType::IntentRouterShadow
    } else {
        StepType::IntentRouter
    };
    state
        .ledger
        .append_step(trace_id, step_type, serde_json::to_value(&decision)?)?;

    if decision.requires_hitl {
        return Err(Error::HitlPending(
            decision.hitl_id.map(|id| id.to_string()).unwrap_or_default(),
        ));
    }
    let Some(tool_name) = decision.tool.clone() else {
        return Err(Error::NoMatch);
    };

    // Step 3: Policy Engine.
    let policy_decision = state.policy.check(&tool_name, &decision.params, true);
    state
        .ledger
        .append_step(trace_id, StepType::PolicyDecision, serde_json::to_value(&policy_decision)?)?;
    if !policy_decision.allow {
        return Err(Error::PolicyDenied(policy_decision.reason));
    }

    // A resolved name present in the Tool Registry is a tool intent;
    // anything else names a model and is a generative intent.
    let tool_spec = state.executor.registry().lookup_spec(&tool_name);

    // Step 4: approval, only for an unsafe registered tool.
    if let Some(spec) = &tool_spec {
        check_approval(
            state,
            trace_id,
            &tool_name,
            &decision.params,
            spec.safety,
            req.approval_id.as_deref(),
        )?;
    }

    // Step 5: dispatch.
    let output = if tool_spec.is_some() {
        let outcome = state.executor.execute(&tool_name, &decision.params).await?;
        state
            .ledger
            .append_step(trace_id, StepType::ToolExecute, serde_json::to_value(&outcome.result)?)?;
        serde_json::to_value(&outcome.result)?
    } else {
        let provider_id = req
            .provider
            .clone()
            .or_else(|| default_provider_id(state))
            .ok_or_else(|| {
                Error::MalformedRequest("provider is required for a generative intent".to_string())
            })?;
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: req.input.clone(),
        }];
        let response = state.providers.chat(&provider_id, &tool_name, &messages).await?;
        state
            .ledger
            .append_step(trace_id, StepType::ProviderCall, serde_json::to_value(&response)?)?;
        serde_json::to_value(&response)?
    };

    // Step 6: response_sent, close trace.
    state
        .ledger
        .append_step(trace_id, StepType::ResponseSent, json!({ "tool": tool_name }))?;
    state.ledger.close_trace(trace_id)?;

    Ok(ChatResponse {
        trace_id,
        tool: Some(tool_name),
        tier_used: decision.tier_used,
        output,
    })
}

/// `handle_approve`: delegates straight to the Approval Store.
pub fn handle_approve(state: &AppState, req: ApproveRequest) -> Result<Approval> {
    state.approvals.issue(&req.tool, &req.args, req.ttl_seconds)
}

/// `handle_execute`: steps 3-6 of the chat pipeline, skipping intent
/// routing — the tool name is given explicitly.
pub async fn handle_execute(state: &AppState, req: ExecuteRequest) -> (TraceId, Result<ExecuteResponse>) {
    let trace_id = match state.ledger.open_trace(None) {
        Ok(id) => id,
        Err(e) => return (TraceId::new(), Err(e)),
    };

    match handle_execute_inner(state, trace_id, req).await {
        Ok(response) => (trace_id, Ok(response)),
        Err(e) => {
            let _ = state.ledger.close_trace(trace_id);
            (trace_id, Err(e))
        }
    }
}

async fn handle_execute_inner(state: &AppState, trace_id: TraceId, req: ExecuteRequest) -> Result<ExecuteResponse> {
    state
        .ledger
        .append_step(trace_id, StepType::RequestReceived, json!({ "tool": req.name }))?;

    // Step 3: Policy Engine.
    let policy_decision = state.policy.check(&req.name, &req.args, true);
    state
        .ledger
        .append_step(trace_id, StepType::PolicyDecision, serde_json::to_value(&policy_decision)?)?;
    if !policy_decision.allow {
        return Err(Error::PolicyDenied(policy_decision.reason));
    }

    let spec = state
        .executor
        .registry()
        .lookup_spec(&req.name)
        .ok_or_else(|| Error::ToolNotFound(req.name.clone()))?;

    // Step 4: approval.
    check_approval(
        state,
        trace_id,
        &req.name,
        &req.args,
        spec.safety,
        req.approval_id.as_deref(),
    )?;

    // Step 5: dispatch (tool intent only — the tool name is explicit).
    let outcome = state.executor.execute(&req.name, &req.args).await?;
    state
        .ledger
        .append_step(trace_id, StepType::ToolExecute, serde_json::to_value(&outcome.result)?)?;

    // Step 6: response_sent, close trace.
    state
        .ledger
        .append_step(trace_id, StepType::ResponseSent, json!({ "tool": req.name }))?;
    state.ledger.close_trace(trace_id)?;

    Ok(ExecuteResponse {
        trace_id,
        tool: req.name,
        result: outcome.result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_approval::ApprovalStore;
    use warden_domain::config::Config;
    use warden_domain::model::{RoutableTool, RouterRule, RuleOutcome};
    use warden_ledger::Ledger;
    use warden_policy::PolicyEngine;
    use warden_providers::Providers;
    use warden_router::{IntentRouter, LexicalEmbedder};
    use warden_store::Store;
    use warden_tools::builtin_executor;

    fn test_state() -> AppState {
        let store = Store::in_memory().unwrap();
        let mut config = Config::default();
        config.router.rules = vec![RouterRule {
            match_pattern: "^echo (?P<message>.+)$".to_string(),
            outcome: RuleOutcome::Allow,
            tool: Some("echo".to_string()),
            reason: "explicit echo prefix".to_string(),
        }];
        config.router.tools = vec![RoutableTool {
            name: "echo".to_string(),
            description: "repeat the given text back to the user".to_string(),
            tier3_required: false,
        }];
        config.router.min_confidence = 0.1;
        config.router.min_gap = 0.01;

        let router = IntentRouter::new(config.router.clone(), Arc::new(LexicalEmbedder), store.clone()).unwrap();
        config.sandbox.tool_dir = ".".to_string();
        config.sandbox.wall_clock_timeout_sec = 5;

        AppState {
            config: Arc::new(config.clone()),
            ledger: Arc::new(Ledger::new(store.clone(), 500)),
            policy: Arc::new(PolicyEngine::new(vec![], false).unwrap()),
            approvals: Arc::new(ApprovalStore::new(store.clone(), 900)),
            executor: Arc::new(builtin_executor(config.sandbox.clone())),
            providers: Arc::new(Providers::new(true)),
            router: Arc::new(router),
            api_token_hash: None,
            admin_token_hash: None,
        }
    }

    #[tokio::test]
    async fn rule_hit_dispatches_to_echo() {
        let state = test_state();
        let (_trace_id, result) = handle_chat(
            &state,
            ChatRequest {
                input: "echo hello world".to_string(),
                provider: None,
                approval_id: None,
            },
        )
        .await;
        let response = result.unwrap();
        assert_eq!(response.tool.as_deref(), Some("echo"));
        assert_eq!(response.output["value"]["output"], serde_json::json!("Echo: hello world"));
    }

    #[tokio::test]
    async fn unsafe_tool_without_approval_is_rejected() {
        let state = test_state();
        let (_trace_id, result) = handle_execute(
            &state,
            ExecuteRequest {
                name: "python_exec".to_string(),
                args: serde_json::json!({ "code": "print(1)" }),
                approval_id: None,
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::ApprovalRequired(ApprovalRejection::MissingApproval))
        ));
    }

    #[tokio::test]
    async fn approved_execute_succeeds_then_rejects_replay() {
        let state = test_state();
        let args = serde_json::json!({ "code": "print(1)" });
        let approval = handle_approve(
            &state,
            ApproveRequest {
                tool: "python_exec".to_string(),
                args: args.clone(),
                ttl_seconds: None,
            },
        )
        .unwrap();

        let (_trace_id, result) = handle_execute(
            &state,
            ExecuteRequest {
                name: "python_exec".to_string(),
                args: args.clone(),
                approval_id: Some(approval.approval_id.to_string()),
            },
        )
        .await;
        assert!(result.is_ok());

        let (_trace_id, replay) = handle_execute(
            &state,
            ExecuteRequest {
                name: "python_exec".to_string(),
                args,
                approval_id: Some(approval.approval_id.to_string()),
            },
        )
        .await;
        assert!(matches!(
            replay,
            Err(Error::ApprovalRequired(ApprovalRejection::AlreadyConsumed))
        ));
    }

    #[tokio::test]
    async fn args_hash_mismatch_is_rejected() {
        let state = test_state();
        let approval = handle_approve(
            &state,
            ApproveRequest {
                tool: "python_exec".to_string(),
                args: serde_json::json!({ "code": "print(1)" }),
                ttl_seconds: None,
            },
        )
        .unwrap();

        let (_trace_id, result) = handle_execute(
            &state,
            ExecuteRequest {
                name: "python_exec".to_string(),
                args: serde_json::json!({ "code": "print(2)" }),
                approval_id: Some(approval.approval_id.to_string()),
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::ApprovalRequired(ApprovalRejection::ArgsHashMismatch))
        ));
    }

    #[tokio::test]
    async fn no_match_input_errors_without_dispatch() {
        let state = test_state();
        let (_trace_id, result) = handle_chat(
            &state,
            ChatRequest {
                input: "completely unrelated gibberish about nothing at all".to_string(),
                provider: None,
                approval_id: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::NoMatch)));
    }
}
