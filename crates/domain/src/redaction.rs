//! Shared redaction ruleset (spec §4.1), applied identically by the Trace
//! Ledger's read API, the Tool Executor's output scrub, and the HTTP
//! boundary's error-message scrub — one table, not three.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Default truncation cap in characters (spec §4.1).
pub const DEFAULT_REDACTION_CAP: usize = 500;

const REDACTED_KEYS: &[&str] = &["authorization", "api_key", "token", "secret", "password"];

fn bearer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bearer\s+[a-z0-9\-._~+/]+=*").unwrap())
}

fn jwt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
    })
}

/// Scrub a single string: mask bearer tokens, JWT-shaped strings, and
/// emails, then truncate to `cap` characters with an ellipsis suffix.
pub fn scrub_string(input: &str, cap: usize) -> String {
    let scrubbed = bearer_re().replace_all(input, "<redacted>");
    let scrubbed = jwt_re().replace_all(&scrubbed, "<redacted>");
    let scrubbed = email_re().replace_all(&scrubbed, "<redacted>");
    truncate_chars(&scrubbed, cap)
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let truncated: String = s.chars().take(cap).collect();
    format!("{truncated}...")
}

/// Recursively redact a JSON value: keys matching the secret-key list are
/// replaced wholesale, every remaining string is scrubbed and capped.
pub fn redact_value(value: &Value, cap: usize) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if REDACTED_KEYS.iter().any(|rk| rk.eq_ignore_ascii_case(k)) {
                    out.insert(k.clone(), Value::String("<redacted>".to_string()));
                } else {
                    out.insert(k.clone(), redact_value(v, cap));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(v, cap)).collect()),
        Value::String(s) => Value::String(scrub_string(s, cap)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_known_keys() {
        let v = json!({"api_key": "sk-abc123", "nested": {"Authorization": "Bearer xyz"}});
        let redacted = redact_value(&v, DEFAULT_REDACTION_CAP);
        assert_eq!(redacted["api_key"], json!("<redacted>"));
        assert_eq!(redacted["nested"]["Authorization"], json!("<redacted>"));
    }

    #[test]
    fn scrubs_bearer_tokens_in_free_text() {
        let s = scrub_string("Authorization: Bearer abc.def-ghi~jkl", DEFAULT_REDACTION_CAP);
        assert!(s.contains("<redacted>"));
        assert!(!s.contains("abc.def-ghi"));
    }

    #[test]
    fn scrubs_emails() {
        let s = scrub_string("contact alice@example.com for help", DEFAULT_REDACTION_CAP);
        assert_eq!(s, "contact <redacted> for help");
    }

    #[test]
    fn truncates_long_values_with_ellipsis() {
        let long = "a".repeat(10);
        let s = scrub_string(&long, 4);
        assert_eq!(s, "aaaa...");
    }

    #[test]
    fn leaves_short_values_untouched() {
        let s = scrub_string("short", DEFAULT_REDACTION_CAP);
        assert_eq!(s, "short");
    }
}
