//! Canonical JSON serialization (spec §4.4).
//!
//! UTF-8 text, sorted object keys at every depth, no insignificant
//! whitespace, numbers preserved as their source lexeme. Used by both the
//! approval args-hash and the intent cache signature so the two never
//! disagree about what "the same arguments" means.
//!
//! Lexeme preservation requires the caller's `serde_json::Value` to have
//! been parsed with the `arbitrary_precision` feature enabled (set at the
//! workspace level); otherwise `1.50` and `1.5` would already have collapsed
//! to the same `f64` before reaching this module.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serialize a JSON value to its canonical string form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 of the canonical serialization, as lowercase hex.
pub fn canonical_hash(value: &Value) -> String {
    let canon = canonical_json(value);
    hex::encode(Sha256::digest(canon.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s).expect("string encodes")),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).expect("key encodes"));
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}
