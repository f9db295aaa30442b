use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}
fn d_db_path() -> String {
    "warden-ledger.db".to_string()
}
fn d_redaction_cap() -> usize {
    crate::redaction::DEFAULT_REDACTION_CAP
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_db_path")]
    pub database_path: String,
    #[serde(default = "d_redaction_cap")]
    pub redaction_cap: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            database_path: d_db_path(),
            redaction_cap: d_redaction_cap(),
        }
    }
}
