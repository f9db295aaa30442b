//! Provider adapters: translate the internal chat message list into a
//! specific HTTP wire format and back. Grounded on the OpenAI-compatible
//! adapter's auth-header/body-shape pattern, generalized behind a trait
//! so the circuit-breaker/retry loop in `lib.rs` stays provider-agnostic.

use warden_domain::error::{Error, Result};
use warden_domain::model::ChatMessage;

/// Raw reply from a provider call before output capping.
pub struct RawReply {
    pub content: String,
    pub model: String,
}

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn send(&self, messages: &[ChatMessage], model: &str) -> Result<RawReply>;
}

/// An OpenAI-compatible chat completions adapter (OpenAI, Azure OpenAI,
/// Ollama, vLLM, and any endpoint following the same wire contract).
pub struct OpenAiCompatAdapter {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    pub fn new(base_url: String, api_key: Option<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    async fn send(&self, messages: &[ChatMessage], model: &str) -> Result<RawReply> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages.iter().map(|m| serde_json::json!({
                "role": m.role,
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(if status.as_u16() == 422 || status.as_u16() == 400 {
                Error::ModelRejected(text)
            } else {
                Error::Protocol(format!("http {status}: {text}"))
            });
        }

        let value: serde_json::Value = response.json().await.map_err(|e| {
            Error::Protocol(format!("invalid response body: {e}"))
        })?;

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Protocol("missing choices[0].message.content".to_string()))?
            .to_string();
        let model = value["model"].as_str().unwrap_or(model).to_string();

        Ok(RawReply { content, model })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Network(e.to_string())
    }
}
