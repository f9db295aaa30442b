use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}
fn d_policy_path() -> String {
    "policy.yaml".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// When false, an unmatched tool is allowed by default instead of denied.
    #[serde(default = "d_true")]
    pub enforcement: bool,
    #[serde(default = "d_policy_path")]
    pub document_path: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforcement: d_true(),
            document_path: d_policy_path(),
        }
    }
}
