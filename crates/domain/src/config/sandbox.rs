use serde::{Deserialize, Serialize};

fn d_true() -> bool {
    true
}
fn d_false() -> bool {
    false
}
fn d_cpu_quota() -> f32 {
    0.5
}
fn d_memory_cap_mb() -> u64 {
    256
}
fn d_timeout_sec() -> u64 {
    10
}
fn d_tool_dir() -> String {
    "./sandbox-tools".to_string()
}
fn d_max_output_chars() -> usize {
    4_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Unsafe tools must run sandboxed; in-process execution is refused.
    #[serde(default = "d_true")]
    pub required: bool,
    /// Permit in-process fallback when the sandbox is unavailable.
    #[serde(default = "d_false")]
    pub fallback: bool,
    pub image_reference: Option<String>,
    #[serde(default = "d_cpu_quota")]
    pub cpu_quota: f32,
    #[serde(default = "d_memory_cap_mb")]
    pub memory_cap_mb: u64,
    #[serde(default = "d_timeout_sec")]
    pub wall_clock_timeout_sec: u64,
    #[serde(default = "d_tool_dir")]
    pub tool_dir: String,
    #[serde(default = "d_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            required: d_true(),
            fallback: d_false(),
            image_reference: None,
            cpu_quota: d_cpu_quota(),
            memory_cap_mb: d_memory_cap_mb(),
            wall_clock_timeout_sec: d_timeout_sec(),
            tool_dir: d_tool_dir(),
            max_output_chars: d_max_output_chars(),
        }
    }
}
