use serde::{Deserialize, Serialize};

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".to_string()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".to_string(), "http://127.0.0.1:*".to_string()]
}
fn d_max_request_bytes() -> usize {
    1_048_576
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: Option<u32>,
    pub burst_size: Option<u32>,
    pub store_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "d_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            max_request_bytes: d_max_request_bytes(),
        }
    }
}
