mod approval;
mod ledger;
mod policy;
mod provider;
mod router;
mod sandbox;
mod server;

pub use approval::ApprovalConfig;
pub use ledger::TraceConfig;
pub use policy::PolicyConfig;
pub use provider::{ProviderEntryConfig, ProvidersConfig};
pub use router::RouterConfig;
pub use sandbox::SandboxConfig;
pub use server::{CorsConfig, RateLimitConfig, ServerConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

fn d_admin_token_env() -> String {
    "WARDEN_ADMIN_TOKEN".to_string()
}
fn d_api_token_env() -> String {
    "WARDEN_API_TOKEN".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            admin_token_env: d_admin_token_env(),
            api_token_env: d_api_token_env(),
        }
    }
}

/// The full configuration record, assembled once at startup and passed
/// through component constructors (spec §9's "global mutable
/// configuration" re-architecting note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub trace: TraceConfig,
    pub policy: PolicyConfig,
    pub approval: ApprovalConfig,
    pub sandbox: SandboxConfig,
    pub providers: ProvidersConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn has_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Validate the assembled config, returning every issue found (errors
    /// and warnings) rather than bailing at the first one.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must not be 0".into(),
            });
        }
        if self.server.host.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self
            .server
            .cors
            .allowed_origins
            .iter()
            .any(|o| o == "*")
        {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard origin '*' disables CORS protection".into(),
            });
        }
        if let Some(rpm) = self.server.rate_limit.requests_per_minute {
            if rpm == 0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_minute".into(),
                    message: "must be greater than 0 when set".into(),
                });
            }
        }
        if let Some(burst) = self.server.rate_limit.burst_size {
            if burst == 0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "must be greater than 0 when set".into(),
                });
            }
        }

        if self.trace.enabled && self.trace.database_path.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "trace.database_path".into(),
                message: "database_path must not be empty when trace is enabled".into(),
            });
        }

        if self.policy.document_path.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "policy.document_path".into(),
                message: "document_path must not be empty".into(),
            });
        }

        if self.approval.ttl_seconds == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "approval.ttl_seconds".into(),
                message: "ttl_seconds must be greater than 0".into(),
            });
        }

        if self.sandbox.required && !self.sandbox.enabled && !self.sandbox.fallback {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sandbox.enabled".into(),
                message: "sandbox is required but disabled, and fallback is not permitted".into(),
            });
        }
        if self.sandbox.cpu_quota <= 0.0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sandbox.cpu_quota".into(),
                message: "cpu_quota must be greater than 0".into(),
            });
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut provider_keys: Vec<_> = self.providers.providers.keys().collect();
        provider_keys.sort();
        for key in provider_keys {
            let p = &self.providers.providers[key];
            if p.id.trim().is_empty() {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.providers.{key}.id"),
                    message: "id must not be empty".into(),
                });
            } else if !seen_ids.insert(p.id.clone()) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("providers.providers.{key}.id"),
                    message: format!("duplicate provider id '{}'", p.id),
                });
            }
            if p.base_url.trim().is_empty() {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.providers.{key}.base_url"),
                    message: "base_url must not be empty".into(),
                });
            } else if !has_scheme(&p.base_url) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.providers.{key}.base_url"),
                    message: "base_url must start with http:// or https://".into(),
                });
            }
            if p.circuit_max_failures == 0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.providers.{key}.circuit_max_failures"),
                    message: "must be greater than 0".into(),
                });
            }
        }
        if self.providers.providers.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "providers.providers".into(),
                message: "no providers configured; generative intents will fail".into(),
            });
        }

        if self.router.enabled {
            if self.router.min_confidence < 0.0 || self.router.min_confidence > 1.0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "router.min_confidence".into(),
                    message: "must be within [0.0, 1.0]".into(),
                });
            }
            if self.router.min_gap < 0.0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "router.min_gap".into(),
                    message: "must be non-negative".into(),
                });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.providers.providers.insert(
            "openai".into(),
            ProviderEntryConfig {
                id: "openai".into(),
                base_url: "https://api.openai.com".into(),
                ..Default::default()
            },
        );
        cfg
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|i| i.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_has_no_errors() {
        let cfg = valid_config();
        let issues = cfg.validate();
        assert!(
            issues.iter().all(|i| i.severity == ConfigSeverity::Warning),
            "expected no errors, got {issues:?}"
        );
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.port").is_some());
    }

    #[test]
    fn empty_host_is_an_error() {
        let mut cfg = valid_config();
        cfg.server.host = "".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.host").is_some());
    }

    #[test]
    fn wildcard_cors_is_a_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors").expect("warning present");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn provider_missing_scheme_is_an_error() {
        let mut cfg = valid_config();
        cfg.providers.providers.get_mut("openai").unwrap().base_url = "api.openai.com".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "providers.providers.openai.base_url").is_some());
    }

    #[test]
    fn duplicate_provider_ids_are_a_warning() {
        let mut cfg = valid_config();
        cfg.providers.providers.insert(
            "openai2".into(),
            ProviderEntryConfig {
                id: "openai".into(),
                base_url: "https://api.openai.com".into(),
                ..Default::default()
            },
        );
        let issues = cfg.validate();
        let issue = find_issue(&issues, "providers.providers.openai2.id").expect("warning present");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_providers_is_a_warning() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "providers.providers").is_some());
    }

    #[test]
    fn sandbox_required_without_enabled_or_fallback_is_an_error() {
        let mut cfg = valid_config();
        cfg.sandbox.required = true;
        cfg.sandbox.enabled = false;
        cfg.sandbox.fallback = false;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "sandbox.enabled").is_some());
    }

    #[test]
    fn router_confidence_out_of_range_is_an_error() {
        let mut cfg = valid_config();
        cfg.router.min_confidence = 1.5;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "router.min_confidence").is_some());
    }

    #[test]
    fn display_formats_severity_tag() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "x.y".into(),
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "[ERROR] x.y: bad");
        let warn = ConfigError {
            severity: ConfigSeverity::Warning,
            field: "x.y".into(),
            message: "meh".into(),
        };
        assert_eq!(warn.to_string(), "[WARN] x.y: meh");
    }
}
