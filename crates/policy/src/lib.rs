//! Policy Engine (C2): ordered allow/deny rules with conditions over
//! tool name and arguments, hot-reloadable with read-copy-update
//! semantics so in-flight decisions keep the policy_hash they captured.

use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use warden_domain::canonical_json::canonical_hash;
use warden_domain::error::{Error, Result};
use warden_domain::model::{PolicyAction, PolicyDecision, PolicyRule};

struct CompiledRule {
    regex: Regex,
    rule: PolicyRule,
}

struct PolicyState {
    rules: Vec<CompiledRule>,
    policy_hash: String,
}

pub struct PolicyEngine {
    state: RwLock<Arc<PolicyState>>,
    /// When false, an unmatched tool is allowed instead of denied.
    enforcement: bool,
}

impl PolicyEngine {
    pub fn new(rules: Vec<PolicyRule>, enforcement: bool) -> Result<Self> {
        let state = compile(rules)?;
        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            enforcement,
        })
    }

    /// Parses an ordered rule list out of a YAML-shaped document.
    pub fn from_yaml(document: &str, enforcement: bool) -> Result<Self> {
        let rules: Vec<PolicyRule> = serde_yaml::from_str(document)
            .map_err(|e| Error::Config(format!("invalid policy document: {e}")))?;
        Self::new(rules, enforcement)
    }

    pub fn policy_hash(&self) -> String {
        self.state.read().policy_hash.clone()
    }

    /// Hot-reloads the rule set, publishing a new `policy_hash` atomically.
    /// In-flight decisions keep referencing the hash they already captured.
    pub fn reload(&self, rules: Vec<PolicyRule>) -> Result<String> {
        let state = compile(rules)?;
        let hash = state.policy_hash.clone();
        *self.state.write() = Arc::new(state);
        Ok(hash)
    }

    /// Evaluates rules in order against `tool_name`/`args`. `safe_flag`
    /// marks whether the tool is declared safe, carried through so the
    /// caller can log the decision context; it does not itself gate
    /// the outcome — conditions do.
    pub fn check(&self, tool_name: &str, args: &serde_json::Value, _safe_flag: bool) -> PolicyDecision {
        let state = self.state.read().clone();

        for (index, compiled) in state.rules.iter().enumerate() {
            if !compiled.regex.is_match(tool_name) {
                continue;
            }
            if !conditions_satisfied(&compiled.rule, args) {
                continue;
            }
            return PolicyDecision {
                allow: compiled.rule.action == PolicyAction::Allow,
                reason: compiled.rule.reason.clone(),
                matched_rule_index: Some(index),
                policy_hash: state.policy_hash.clone(),
            };
        }

        PolicyDecision {
            allow: !self.enforcement,
            reason: if self.enforcement {
                "no matching rule; default deny".to_string()
            } else {
                "no matching rule; enforcement disabled".to_string()
            },
            matched_rule_index: None,
            policy_hash: state.policy_hash.clone(),
        }
    }
}

fn conditions_satisfied(rule: &PolicyRule, args: &serde_json::Value) -> bool {
    let c = &rule.conditions;

    if let (Some(param), Some(max_len)) = (&c.input_param, c.max_input_len) {
        if let Some(value) = args.get(param).and_then(|v| v.as_str()) {
            if value.chars().count() > max_len {
                return false;
            }
        }
    }

    if !c.required_flags.is_empty() {
        let present: Vec<&str> = args
            .get("flags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default();
        if !c.required_flags.iter().all(|f| present.contains(&f.as_str())) {
            return false;
        }
    }

    true
}

fn compile(rules: Vec<PolicyRule>) -> Result<PolicyState> {
    let serialized: Vec<serde_json::Value> = rules
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()
        .map_err(Error::Json)?;
    let policy_hash = canonical_hash(&serde_json::Value::Array(serialized));

    let compiled = rules
        .into_iter()
        .map(|rule| {
            Regex::new(&rule.match_pattern)
                .map(|regex| CompiledRule { regex, rule })
                .map_err(|e| Error::Config(format!("invalid policy regex: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PolicyState {
        rules: compiled,
        policy_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_domain::model::PolicyConditions;

    fn rule(pattern: &str, action: PolicyAction, reason: &str) -> PolicyRule {
        PolicyRule {
            match_pattern: pattern.to_string(),
            action,
            reason: reason.to_string(),
            conditions: PolicyConditions::default(),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let engine = PolicyEngine::new(
            vec![
                rule("^echo$", PolicyAction::Allow, "echo is safe"),
                rule("^.*$", PolicyAction::Deny, "default deny"),
            ],
            true,
        )
        .unwrap();
        let decision = engine.check("echo", &serde_json::json!({}), true);
        assert!(decision.allow);
        assert_eq!(decision.matched_rule_index, Some(0));
    }

    #[test]
    fn unmatched_tool_denies_when_enforcement_on() {
        let engine = PolicyEngine::new(vec![], true).unwrap();
        let decision = engine.check("python_exec", &serde_json::json!({}), false);
        assert!(!decision.allow);
        assert!(decision.matched_rule_index.is_none());
    }

    #[test]
    fn unmatched_tool_allows_when_enforcement_off() {
        let engine = PolicyEngine::new(vec![], false).unwrap();
        let decision = engine.check("python_exec", &serde_json::json!({}), false);
        assert!(decision.allow);
    }

    #[test]
    fn input_param_length_condition_skips_rule() {
        let mut r = rule("^echo$", PolicyAction::Allow, "short messages only");
        r.conditions = PolicyConditions {
            input_param: Some("message".to_string()),
            max_input_len: Some(5),
            required_flags: vec![],
        };
        let engine = PolicyEngine::new(vec![r, rule("^.*$", PolicyAction::Deny, "fallback")], true).unwrap();

        let short = engine.check("echo", &serde_json::json!({ "message": "hi" }), true);
        assert!(short.allow);

        let long = engine.check("echo", &serde_json::json!({ "message": "way too long" }), true);
        assert!(!long.allow);
        assert_eq!(long.reason, "fallback");
    }

    #[test]
    fn required_flags_condition_gates_the_rule() {
        let mut r = rule("^python_exec$", PolicyAction::Allow, "approved execution");
        r.conditions = PolicyConditions {
            input_param: None,
            max_input_len: None,
            required_flags: vec!["approved".to_string()],
        };
        let engine = PolicyEngine::new(vec![r, rule("^.*$", PolicyAction::Deny, "fallback")], true).unwrap();

        let denied = engine.check("python_exec", &serde_json::json!({}), false);
        assert!(!denied.allow);

        let allowed = engine.check(
            "python_exec",
            &serde_json::json!({ "flags": ["approved"] }),
            false,
        );
        assert!(allowed.allow);
    }

    #[test]
    fn reload_publishes_new_hash_and_inflight_keeps_old_one() {
        let engine = PolicyEngine::new(vec![rule("^.*$", PolicyAction::Allow, "v1")], true).unwrap();
        let decision_before = engine.check("echo", &serde_json::json!({}), true);
        let new_hash = engine
            .reload(vec![rule("^.*$", PolicyAction::Deny, "v2")])
            .unwrap();
        assert_ne!(decision_before.policy_hash, new_hash);
        let decision_after = engine.check("echo", &serde_json::json!({}), true);
        assert_eq!(decision_after.policy_hash, new_hash);
        assert!(!decision_after.allow);
    }

    #[test]
    fn same_rules_produce_same_hash() {
        let a = PolicyEngine::new(vec![rule("^echo$", PolicyAction::Allow, "ok")], true).unwrap();
        let b = PolicyEngine::new(vec![rule("^echo$", PolicyAction::Allow, "ok")], true).unwrap();
        assert_eq!(a.policy_hash(), b.policy_hash());
    }

    #[test]
    fn from_yaml_parses_rule_list() {
        let yaml = r#"
- match_pattern: "^echo$"
  action: allow
  reason: "echo is safe"
- match_pattern: "^.*$"
  action: deny
  reason: "default deny"
"#;
        let engine = PolicyEngine::from_yaml(yaml, true).unwrap();
        assert!(engine.check("echo", &serde_json::json!({}), true).allow);
        assert!(!engine.check("rm_rf", &serde_json::json!({}), false).allow);
    }
}
