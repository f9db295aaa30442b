use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}
fn d_ttl() -> u64 {
    900
}
fn d_db_path() -> String {
    "warden-approvals.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    #[serde(default = "d_true")]
    pub enforcement: bool,
    #[serde(default = "d_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "d_db_path")]
    pub database_path: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enforcement: d_true(),
            ttl_seconds: d_ttl(),
            database_path: d_db_path(),
        }
    }
}
