//! Provider Client (C5): a per-provider circuit breaker wraps a
//! timeout/retry loop around a pluggable wire adapter, capping and
//! classifying errors per spec §4.5.

pub mod adapter;
pub mod circuit;

pub use adapter::{OpenAiCompatAdapter, ProviderAdapter, RawReply};
pub use circuit::CircuitBreaker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use warden_domain::config::ProviderEntryConfig;
use warden_domain::error::{Error, Result};
use warden_domain::model::{ChatMessage, ProviderResponse};

struct ProviderClient {
    adapter: Arc<dyn ProviderAdapter>,
    config: ProviderEntryConfig,
    circuit: CircuitBreaker,
}

/// Top-level provider client: holds one circuit-breaker-guarded client
/// per configured provider, gated by a network-wide enable flag.
pub struct Providers {
    network_enabled: bool,
    clients: HashMap<String, ProviderClient>,
}

impl Providers {
    pub fn new(network_enabled: bool) -> Self {
        Self {
            network_enabled,
            clients: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider_id: &str, adapter: Arc<dyn ProviderAdapter>, config: ProviderEntryConfig) {
        let circuit = CircuitBreaker::new(config.circuit_max_failures, config.circuit_reset_seconds);
        self.clients.insert(
            provider_id.to_string(),
            ProviderClient {
                adapter,
                config,
                circuit,
            },
        );
    }

    pub async fn chat(
        &self,
        provider_id: &str,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<ProviderResponse> {
        if !self.network_enabled {
            return Err(Error::NetworkDisabled);
        }

        let client = self
            .clients
            .get(provider_id)
            .ok_or_else(|| Error::Config(format!("unknown provider '{provider_id}'")))?;

        if !client.config.model_allowlist.is_empty()
            && !client.config.model_allowlist.iter().any(|m| m == model_id)
        {
            return Err(Error::ModelRejected(format!(
                "model '{model_id}' is not in the allowlist for provider '{provider_id}'"
            )));
        }

        if !client.circuit.allow() {
            return Err(Error::CircuitOpen);
        }

        let start = Instant::now();
        let total_attempts = 1 + client.config.retry_count;
        let mut last_err = None;

        for attempt in 1..=total_attempts {
            let call = tokio::time::timeout(
                std::time::Duration::from_millis(client.config.timeout_ms),
                client.adapter.send(messages, model_id),
            )
            .await;

            let outcome = match call {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!(
                    "provider '{provider_id}' call exceeded {}ms",
                    client.config.timeout_ms
                ))),
            };

            match outcome {
                Ok(reply) => {
                    client.circuit.record_success();
                    let (content, truncated) = cap_output(reply.content, client.config.max_output_chars);
                    return Ok(ProviderResponse {
                        content,
                        model: reply.model,
                        provider: provider_id.to_string(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        attempts: attempt,
                        truncated,
                    });
                }
                Err(err) => {
                    if matches!(err, Error::Timeout(_) | Error::Network(_)) {
                        client.circuit.record_failure();
                    }
                    last_err = Some(err);
                    if attempt < total_attempts {
                        tokio::time::sleep(std::time::Duration::from_secs(
                            client.config.retry_backoff_seconds,
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(Error::Other("provider call failed with no recorded error".to_string())))
    }
}

fn cap_output(content: String, cap: usize) -> (String, bool) {
    if content.chars().count() <= cap {
        (content, false)
    } else {
        (content.chars().take(cap).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedAdapter {
        calls: AtomicUsize,
        script: Vec<Result<RawReply>>,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        async fn send(&self, _messages: &[ChatMessage], model: &str) -> Result<RawReply> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script[i.min(self.script.len() - 1)] {
                Ok(reply) => Ok(RawReply {
                    content: reply.content.clone(),
                    model: model.to_string(),
                }),
                Err(e) => Err(clone_err(e)),
            }
        }
    }

    fn clone_err(e: &Error) -> Error {
        match e {
            Error::Timeout(s) => Error::Timeout(s.clone()),
            Error::Network(s) => Error::Network(s.clone()),
            Error::Protocol(s) => Error::Protocol(s.clone()),
            Error::ModelRejected(s) => Error::ModelRejected(s.clone()),
            other => Error::Other(format!("{other}")),
        }
    }

    fn cfg() -> ProviderEntryConfig {
        ProviderEntryConfig {
            id: "test".to_string(),
            base_url: "http://localhost".to_string(),
            timeout_ms: 5_000,
            retry_count: 2,
            retry_backoff_seconds: 0,
            max_output_chars: 8_000,
            circuit_max_failures: 3,
            circuit_reset_seconds: 60,
            model_allowlist: vec![],
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
        }]
    }

    #[tokio::test]
    async fn successful_call_returns_response() {
        let mut providers = Providers::new(true);
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![Ok(RawReply {
                content: "hello".to_string(),
                model: "gpt-test".to_string(),
            })],
        });
        providers.register("test", adapter, cfg());

        let response = providers.chat("test", "gpt-test", &messages()).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.attempts, 1);
        assert!(!response.truncated);
    }

    #[tokio::test]
    async fn network_disabled_fails_fast() {
        let mut providers = Providers::new(false);
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![Ok(RawReply {
                content: "hello".to_string(),
                model: "gpt-test".to_string(),
            })],
        });
        providers.register("test", adapter, cfg());

        let err = providers.chat("test", "gpt-test", &messages()).await;
        assert!(matches!(err, Err(Error::NetworkDisabled)));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut providers = Providers::new(true);
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![
                Err(Error::Network("boom".to_string())),
                Ok(RawReply {
                    content: "recovered".to_string(),
                    model: "gpt-test".to_string(),
                }),
            ],
        });
        providers.register("test", adapter, cfg());

        let response = providers.chat("test", "gpt-test", &messages()).await.unwrap();
        assert_eq!(response.attempts, 2);
        assert_eq!(response.content, "recovered");
    }

    #[tokio::test]
    async fn protocol_errors_do_not_trip_the_breaker() {
        let mut providers = Providers::new(true);
        let mut breaker_cfg = cfg();
        breaker_cfg.circuit_max_failures = 1;
        breaker_cfg.retry_count = 0;
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![Err(Error::Protocol("bad json".to_string()))],
        });
        providers.register("test", adapter, breaker_cfg);

        let _ = providers.chat("test", "gpt-test", &messages()).await;
        // A protocol error must not have opened the circuit: a second call
        // is still attempted rather than failing fast with CircuitOpen.
        let err = providers.chat("test", "gpt-test", &messages()).await;
        assert!(!matches!(err, Err(Error::CircuitOpen)));
    }

    #[tokio::test]
    async fn network_errors_trip_the_breaker() {
        let mut providers = Providers::new(true);
        let mut breaker_cfg = cfg();
        breaker_cfg.circuit_max_failures = 1;
        breaker_cfg.retry_count = 0;
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![Err(Error::Network("down".to_string()))],
        });
        providers.register("test", adapter, breaker_cfg);

        let _ = providers.chat("test", "gpt-test", &messages()).await;
        let err = providers.chat("test", "gpt-test", &messages()).await;
        assert!(matches!(err, Err(Error::CircuitOpen)));
    }

    #[tokio::test]
    async fn model_not_in_allowlist_is_rejected() {
        let mut providers = Providers::new(true);
        let mut restricted = cfg();
        restricted.model_allowlist = vec!["gpt-allowed".to_string()];
        let adapter = Arc::new(ScriptedAdapter {
            calls: AtomicUsize::new(0),
            script: vec![Ok(RawReply {
                content: "hi".to_string(),
                model: "gpt-allowed".to_string(),
            })],
        });
        providers.register("test", adapter, restricted);

        let err = providers.chat("test", "gpt-other", &messages()).await;
        assert!(matches!(err, Err(Error::ModelRejected(_))));
    }

    #[test]
    fn caps_long_output() {
        let (capped, truncated) = cap_output("x".repeat(10), 5);
        assert!(truncated);
        assert_eq!(capped.chars().count(), 5);
    }
}
