use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use warden_approval::ApprovalStore;
use warden_domain::config::{Config, ConfigSeverity};
use warden_gateway::{http, state::AppState};
use warden_ledger::Ledger;
use warden_policy::PolicyEngine;
use warden_providers::{OpenAiCompatAdapter, Providers};
use warden_router::{IntentRouter, LexicalEmbedder};
use warden_store::Store;
use warden_tools::builtin_executor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = load_config()?;
    run_server(Arc::new(config)).await
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,warden_gateway=debug")),
        )
        .json()
        .init();
}

/// Reads `WARDEN_CONFIG` (default `config.toml`); falls back to defaults
/// when the file is absent.
fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("WARDEN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if std::path::Path::new(&path).exists() {
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&text).with_context(|| format!("parsing {path}"))
    } else {
        Ok(Config::default())
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("warden starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Store + Trace Ledger (C1) ────────────────────────────────────
    let store = if config.trace.enabled {
        Store::open(&config.trace.database_path).context("opening trace store")?
    } else {
        Store::in_memory().context("opening in-memory store")?
    };
    let ledger = Arc::new(Ledger::new(store.clone(), config.trace.redaction_cap));
    tracing::info!(path = %config.trace.database_path, "trace ledger ready");

    // ── Policy Engine (C2) ───────────────────────────────────────────
    let policy = Arc::new(if std::path::Path::new(&config.policy.document_path).exists() {
        let document = std::fs::read_to_string(&config.policy.document_path)
            .with_context(|| format!("reading {}", config.policy.document_path))?;
        PolicyEngine::from_yaml(&document, config.policy.enforcement).context("compiling policy document")?
    } else {
        tracing::warn!(path = %config.policy.document_path, "policy document not found, starting with no rules");
        PolicyEngine::new(vec![], config.policy.enforcement).context("compiling empty policy")?
    });
    tracing::info!(policy_hash = %policy.policy_hash(), "policy engine ready");

    // ── Tool Registry & Executor (C3) ────────────────────────────────
    let executor = Arc::new(builtin_executor(config.sandbox.clone()));
    tracing::info!(tools = executor.registry().list().len(), "tool registry ready");

    // ── Approval Store (C4) ──────────────────────────────────────────
    let approvals = Arc::new(ApprovalStore::new(store.clone(), config.approval.ttl_seconds));
    tracing::info!(ttl_seconds = config.approval.ttl_seconds, "approval store ready");

    // ── Provider Client (C5) ─────────────────────────────────────────
    let mut providers = Providers::new(config.providers.network_enabled);
    for (provider_id, entry) in &config.providers.providers {
        let api_key = std::env::var(format!("WARDEN_PROVIDER_{}_API_KEY", provider_id.to_uppercase())).ok();
        let adapter = OpenAiCompatAdapter::new(
            entry.base_url.clone(),
            api_key,
            std::time::Duration::from_millis(entry.timeout_ms),
        )
        .with_context(|| format!("initializing provider adapter {provider_id}"))?;
        providers.register(provider_id, Arc::new(adapter), entry.clone());
    }
    let providers = Arc::new(providers);
    tracing::info!(providers = config.providers.providers.len(), "provider client ready");

    // ── Intent Router (C6) ───────────────────────────────────────────
    let router = Arc::new(
        IntentRouter::new(config.router.clone(), Arc::new(LexicalEmbedder), store.clone())
            .context("initializing intent router")?,
    );
    tracing::info!(rules = config.router.rules.len(), shadow_mode = config.router.shadow_mode, "intent router ready");

    // ── Bearer tokens (read once, hash for constant-time comparison) ─
    let api_token_hash = read_token_hash(&config.admin.api_token_env, "API");
    let admin_token_hash = read_token_hash(&config.admin.admin_token_env, "admin");

    let state = AppState {
        config: config.clone(),
        ledger,
        policy,
        approvals,
        executor,
        providers,
        router,
        api_token_hash,
        admin_token_hash,
    };

    let cors_layer = http::build_cors_layer(&config.server.cors);

    let max_concurrent = std::env::var("WARDEN_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let governor_layer = config.server.rate_limit.requests_per_minute.map(|rpm| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let per_second = (rpm / 60).max(1);
        let burst_size = config.server.rate_limit.burst_size.unwrap_or(per_second);
        let gov_config = GovernorConfigBuilder::default()
            .per_second(per_second as u64)
            .burst_size(burst_size)
            .finish()
            .expect("rate_limit: per_second and burst_size must be > 0");

        tracing::info!(per_second, burst_size, "per-IP rate limiting enabled");
        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no server.rate_limit.requests_per_minute configured)");
    }

    let router = http::router(state)
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov)
    } else {
        router
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "warden listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

fn read_token_hash(env_var: &str, label: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %env_var, "{label} bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(env_var = %env_var, "{label} bearer-token auth DISABLED — set {env_var} to enable");
            None
        }
    }
}
