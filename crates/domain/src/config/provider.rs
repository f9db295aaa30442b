use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn d_true() -> bool {
    true
}
fn d_timeout_ms() -> u64 {
    30_000
}
fn d_retry_count() -> u32 {
    2
}
fn d_retry_backoff_sec() -> u64 {
    1
}
fn d_max_output_chars() -> usize {
    8_000
}
fn d_max_failures() -> u32 {
    5
}
fn d_reset_sec() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntryConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_retry_count")]
    pub retry_count: u32,
    #[serde(default = "d_retry_backoff_sec")]
    pub retry_backoff_seconds: u64,
    #[serde(default = "d_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "d_max_failures")]
    pub circuit_max_failures: u32,
    #[serde(default = "d_reset_sec")]
    pub circuit_reset_seconds: u64,
    #[serde(default)]
    pub model_allowlist: Vec<String>,
}

impl Default for ProviderEntryConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            base_url: String::new(),
            timeout_ms: d_timeout_ms(),
            retry_count: d_retry_count(),
            retry_backoff_seconds: d_retry_backoff_sec(),
            max_output_chars: d_max_output_chars(),
            circuit_max_failures: d_max_failures(),
            circuit_reset_seconds: d_reset_sec(),
            model_allowlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Hard gate on any outbound provider call.
    #[serde(default = "d_true")]
    pub network_enabled: bool,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntryConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            network_enabled: d_true(),
            providers: HashMap::new(),
        }
    }
}
