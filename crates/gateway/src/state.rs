//! Shared application state handed to every axum handler.

use std::sync::Arc;
use warden_approval::ApprovalStore;
use warden_domain::config::Config;
use warden_ledger::Ledger;
use warden_policy::PolicyEngine;
use warden_providers::Providers;
use warden_router::IntentRouter;
use warden_tools::Executor;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Core components (C1-C6) ──────────────────────────────────────
    pub ledger: Arc<Ledger>,
    pub policy: Arc<PolicyEngine>,
    pub approvals: Arc<ApprovalStore>,
    pub executor: Arc<Executor>,
    pub providers: Arc<Providers>,
    pub router: Arc<IntentRouter>,

    // ── Security (read once at startup, hashed for constant-time compare) ──
    pub api_token_hash: Option<Vec<u8>>,
    pub admin_token_hash: Option<Vec<u8>>,
}
