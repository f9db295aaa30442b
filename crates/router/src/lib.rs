//! Intent Router (C6): a deterministic four-tier pipeline (rule gate,
//! cache, semantic similarity, human-in-the-loop) that resolves user
//! input to a bound tool, grounded on the tier centroid/cosine-similarity
//! pattern of an embedding classifier, adapted from per-call tiers to a
//! reusable one-tool-at-a-time router with a persisted cache.

pub mod embedder;

pub use embedder::{Embedder, LexicalEmbedder};

use chrono::Utc;
use rusqlite::OptionalExtension;
use std::sync::Arc;
use warden_domain::canonical_json::{canonical_hash, canonical_json};
use warden_domain::config::RouterConfig;
use warden_domain::error::{Error, Result};
use warden_domain::model::{
    HitlCandidate, HitlRequest, HitlRequestId, HitlState, IntentDecision, IntentTier, RuleOutcome,
    TraceId,
};
use warden_store::Store;

struct CompiledRule {
    regex: regex::Regex,
    outcome: RuleOutcome,
    tool: Option<String>,
    reason: String,
}

/// Resolves user input to a tool via the four-tier pipeline.
pub struct IntentRouter {
    config: RouterConfig,
    rules: Vec<CompiledRule>,
    embedder: Arc<dyn Embedder>,
    store: Store,
}

impl IntentRouter {
    pub fn new(config: RouterConfig, embedder: Arc<dyn Embedder>, store: Store) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|r| {
                regex::Regex::new(&r.match_pattern)
                    .map(|regex| CompiledRule {
                        regex,
                        outcome: r.outcome,
                        tool: r.tool.clone(),
                        reason: r.reason.clone(),
                    })
                    .map_err(|e| Error::Config(format!("invalid router rule regex: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            rules,
            embedder,
            store,
        })
    }

    /// Routes `input_text`, trying each tier in order. `policy_hash` is
    /// the current policy hash; cache entries are keyed and invalidated
    /// against it so a policy reload never serves a stale decision.
    pub fn route(
        &self,
        trace_id: TraceId,
        input_text: &str,
        policy_hash: &str,
    ) -> Result<IntentDecision> {
        let decision = self.route_inner(trace_id, input_text, policy_hash)?;

        if self.config.shadow_mode {
            // Shadow mode computes the decision for comparison but never
            // binds it: callers recording an `intent_router_shadow` step
            // should use this decision, while the bound tool stays unset.
            return Ok(IntentDecision {
                tool: None,
                params: serde_json::Value::Null,
                confidence: decision.confidence,
                gap: decision.gap,
                tier_used: decision.tier_used,
                reason: decision.reason,
                requires_hitl: false,
                policy_hash: decision.policy_hash,
                hitl_id: None,
            });
        }

        Ok(decision)
    }

    fn route_inner(
        &self,
        trace_id: TraceId,
        input_text: &str,
        policy_hash: &str,
    ) -> Result<IntentDecision> {
        if input_text.trim().is_empty() {
            return Ok(match &self.config.default_tool {
                Some(tool) => IntentDecision {
                    tool: Some(tool.clone()),
                    params: serde_json::Value::Object(Default::default()),
                    confidence: 1.0,
                    gap: 1.0,
                    tier_used: IntentTier::RuleGate,
                    reason: "empty input bound to configured default tool".to_string(),
                    requires_hitl: false,
                    policy_hash: policy_hash.to_string(),
                    hitl_id: None,
                },
                None => no_match(policy_hash, "empty input with no default tool", IntentTier::RuleGate),
            });
        }

        // Tier 0: rule gate, first match wins.
        for rule in &self.rules {
            if !rule.regex.is_match(input_text) {
                continue;
            }
            return Ok(match rule.outcome {
                RuleOutcome::Deny => IntentDecision {
                    tool: None,
                    params: serde_json::Value::Null,
                    confidence: 1.0,
                    gap: 1.0,
                    tier_used: IntentTier::RuleGate,
                    reason: rule.reason.clone(),
                    requires_hitl: false,
                    policy_hash: policy_hash.to_string(),
                    hitl_id: None,
                },
                RuleOutcome::Allow => IntentDecision {
                    tool: rule.tool.clone(),
                    params: capture_params(&rule.regex, input_text),
                    confidence: 1.0,
                    gap: 1.0,
                    tier_used: IntentTier::RuleGate,
                    reason: rule.reason.clone(),
                    requires_hitl: false,
                    policy_hash: policy_hash.to_string(),
                    hitl_id: None,
                },
            });
        }

        // Tier 1: cache.
        let signature = cache_signature(policy_hash, input_text);
        if self.config.cache_enabled {
            if let Some(decision) = self.cache_lookup(policy_hash, &signature)? {
                return Ok(decision);
            }
        }

        // Tier 2: semantic similarity.
        if self.config.tools.is_empty() {
            return Ok(no_match(policy_hash, "no routable tools configured", IntentTier::Semantic));
        }

        let input_vec = self.embedder.embed(input_text);
        let mut scored: Vec<(&warden_domain::model::RoutableTool, f32)> = self
            .config
            .tools
            .iter()
            .map(|tool| {
                let tool_vec = self.embedder.embed(&tool.description);
                (tool, cosine_similarity(&input_vec, &tool_vec))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top = scored[0];
        let runner_up = scored.get(1).map(|(_, s)| *s).unwrap_or(f32::NEG_INFINITY);
        let gap = top.1 - runner_up;
        let exact_tie = scored.get(1).is_some_and(|(_, s)| *s == top.1);

        let accepted = !exact_tie && top.1 >= self.config.min_confidence && gap >= self.config.min_gap;

        if accepted {
            let decision = IntentDecision {
                tool: Some(top.0.name.clone()),
                params: serde_json::Value::Object(Default::default()),
                confidence: top.1,
                gap,
                tier_used: IntentTier::Semantic,
                reason: "semantic match above confidence and gap thresholds".to_string(),
                requires_hitl: false,
                policy_hash: policy_hash.to_string(),
                hitl_id: None,
            };
            if self.config.cache_enabled {
                self.cache_put(policy_hash, &signature, &decision)?;
            }
            return Ok(decision);
        }

        // Ambiguous (or below threshold). Tier 3 only applies when the
        // caller requires HITL for the top candidate, or the confidence
        // tier itself is ambiguous rather than simply empty.
        let top_requires_tier3 = top.0.tier3_required;
        let ambiguous = top.1 >= self.config.min_confidence;

        if !ambiguous && !top_requires_tier3 {
            return Ok(no_match(
                policy_hash,
                "no candidate reached the confidence threshold",
                IntentTier::Semantic,
            ));
        }

        if !self.config.hitl_enabled {
            return Ok(no_match(
                policy_hash,
                "ambiguous match and human review is disabled",
                IntentTier::Semantic,
            ));
        }

        let candidates: Vec<HitlCandidate> = scored
            .iter()
            .take(3)
            .map(|(tool, score)| HitlCandidate {
                tool: tool.name.clone(),
                score: *score,
            })
            .collect();
        let guard_reason = if exact_tie {
            "exact tie between top candidates".to_string()
        } else if top_requires_tier3 {
            "top candidate requires human review".to_string()
        } else {
            format!("ambiguous: gap {gap} below min_gap {}", self.config.min_gap)
        };

        let hitl_id = self.enqueue_hitl(trace_id, candidates, guard_reason.clone())?;

        Ok(IntentDecision {
            tool: None,
            params: serde_json::Value::Null,
            confidence: top.1,
            gap,
            tier_used: IntentTier::Hitl,
            reason: guard_reason,
            requires_hitl: true,
            policy_hash: policy_hash.to_string(),
            hitl_id: Some(hitl_id),
        })
    }

    fn cache_lookup(&self, policy_hash: &str, signature: &str) -> Result<Option<IntentDecision>> {
        let now = Utc::now();
        let row: Option<(String, String, f32, String, String, i64)> = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT tool, params, confidence, reason, created_at, ttl_seconds
                 FROM intent_cache WHERE policy_hash = ?1 AND signature = ?2",
                rusqlite::params![policy_hash, signature],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .optional()
        })?;

        let Some((tool, params, confidence, reason, created_at, ttl_seconds)) = row else {
            return Ok(None);
        };

        let created_at: chrono::DateTime<Utc> = created_at
            .parse()
            .map_err(|e| Error::TraceBackendError(format!("corrupt cache row timestamp: {e}")))?;
        if now >= created_at + chrono::Duration::seconds(ttl_seconds) {
            return Ok(None);
        }

        let params: serde_json::Value =
            serde_json::from_str(&params).map_err(Error::Json)?;

        Ok(Some(IntentDecision {
            tool: Some(tool),
            params,
            confidence,
            gap: 0.0,
            tier_used: IntentTier::Cache,
            reason,
            requires_hitl: false,
            policy_hash: policy_hash.to_string(),
            hitl_id: None,
        }))
    }

    fn cache_put(&self, policy_hash: &str, signature: &str, decision: &IntentDecision) -> Result<()> {
        let now = Utc::now();
        let tool = decision.tool.clone().unwrap_or_default();
        let params = canonical_json(&decision.params);
        self.store.with_conn(|conn| {
            // A policy_hash change flushes prior entries for other hashes:
            // stale decisions must never be served once rules are reloaded.
            conn.execute(
                "DELETE FROM intent_cache WHERE policy_hash != ?1",
                rusqlite::params![policy_hash],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO intent_cache
                 (policy_hash, signature, tool, params, confidence, reason, created_at, ttl_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    policy_hash,
                    signature,
                    tool,
                    params,
                    decision.confidence,
                    decision.reason,
                    now.to_rfc3339(),
                    self.config.cache_ttl_seconds,
                ],
            )
        })?;
        Ok(())
    }

    fn enqueue_hitl(
        &self,
        trace_id: TraceId,
        candidates: Vec<HitlCandidate>,
        guard_reason: String,
    ) -> Result<HitlRequestId> {
        let hitl_id = HitlRequestId::new();
        let created_at = Utc::now();
        let candidates_json =
            serde_json::to_string(&candidates).map_err(Error::Json)?;

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO hitl_queue (hitl_id, trace_id, created_at, candidates, guard_reason, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    hitl_id.to_string(),
                    trace_id.to_string(),
                    created_at.to_rfc3339(),
                    candidates_json,
                    guard_reason,
                    "queued",
                ],
            )
        })?;

        Ok(hitl_id)
    }

    /// Fetches a queued HITL request by id, for the orchestrator's
    /// blocking-wait or deferred-status handling.
    pub fn get_hitl(&self, hitl_id: HitlRequestId) -> Result<Option<HitlRequest>> {
        let row: Option<(String, String, String, String, String)> = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT trace_id, created_at, candidates, guard_reason, state
                 FROM hitl_queue WHERE hitl_id = ?1",
                rusqlite::params![hitl_id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()
        })?;

        let Some((trace_id, created_at, candidates, guard_reason, state)) = row else {
            return Ok(None);
        };

        Ok(Some(HitlRequest {
            hitl_id,
            trace_id: trace_id
                .parse()
                .map_err(|_| Error::TraceBackendError("corrupt hitl trace_id".to_string()))?,
            created_at: created_at
                .parse()
                .map_err(|e| Error::TraceBackendError(format!("corrupt hitl timestamp: {e}")))?,
            candidates: serde_json::from_str(&candidates).map_err(Error::Json)?,
            guard_reason,
            state: parse_hitl_state(&state)?,
        }))
    }

    /// Resolves a queued HITL request, recording the human's decision.
    pub fn resolve_hitl(&self, hitl_id: HitlRequestId, approved: bool) -> Result<()> {
        let state = if approved { "approved" } else { "rejected" };
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE hitl_queue SET state = ?1 WHERE hitl_id = ?2",
                rusqlite::params![state, hitl_id.to_string()],
            )
        })?;
        Ok(())
    }
}

fn parse_hitl_state(s: &str) -> Result<HitlState> {
    match s {
        "queued" => Ok(HitlState::Queued),
        "approved" => Ok(HitlState::Approved),
        "rejected" => Ok(HitlState::Rejected),
        "expired" => Ok(HitlState::Expired),
        other => Err(Error::TraceBackendError(format!("unknown hitl state '{other}'"))),
    }
}

fn no_match(policy_hash: &str, reason: &str, tier_used: IntentTier) -> IntentDecision {
    IntentDecision {
        tool: None,
        params: serde_json::Value::Null,
        confidence: 0.0,
        gap: 0.0,
        tier_used,
        reason: reason.to_string(),
        requires_hitl: false,
        policy_hash: policy_hash.to_string(),
        hitl_id: None,
    }
}

/// Builds a params object from a rule's named capture groups, if any
/// matched. A rule with no named groups (or no match) binds `{}`.
fn capture_params(regex: &regex::Regex, input_text: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(caps) = regex.captures(input_text) {
        for name in regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                map.insert(name.to_string(), serde_json::Value::String(m.as_str().to_string()));
            }
        }
    }
    serde_json::Value::Object(map)
}

fn cache_signature(policy_hash: &str, input_text: &str) -> String {
    canonical_hash(&serde_json::json!({
        "policy_hash": policy_hash,
        "input_text": input_text,
    }))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
