use crate::model::{RouterRule, RoutableTool};
use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}
fn d_false() -> bool {
    false
}
fn d_cache_ttl() -> u64 {
    300
}
fn d_min_confidence() -> f32 {
    0.6
}
fn d_min_gap() -> f32 {
    0.08
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Compute a decision but never bind it; record `intent_router_shadow` only.
    #[serde(default = "d_false")]
    pub shadow_mode: bool,
    #[serde(default = "d_true")]
    pub cache_enabled: bool,
    #[serde(default = "d_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "d_true")]
    pub hitl_enabled: bool,
    #[serde(default = "d_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "d_min_gap")]
    pub min_gap: f32,
    /// Ordered Tier-0 rules; first match wins.
    #[serde(default)]
    pub rules: Vec<RouterRule>,
    /// Tools the semantic tier may bind to.
    #[serde(default)]
    pub tools: Vec<RoutableTool>,
    /// Tool bound on empty input, if any.
    #[serde(default)]
    pub default_tool: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            shadow_mode: d_false(),
            cache_enabled: d_true(),
            cache_ttl_seconds: d_cache_ttl(),
            hitl_enabled: d_true(),
            min_confidence: d_min_confidence(),
            min_gap: d_min_gap(),
            rules: Vec::new(),
            tools: Vec::new(),
            default_tool: None,
        }
    }
}
