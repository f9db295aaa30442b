//! Tool Executor (C3): dispatch through the sandbox or in-process,
//! enforcing the output cap and secret scrub spec §4.3 requires.

use crate::handler::Handler;
use crate::registry::ToolRegistry;
use crate::sandbox::SandboxDriver;
use std::time::Instant;
use warden_domain::error::{Error, Result};
use warden_domain::model::ToolExecutionResult;
use warden_domain::redaction::scrub_string;

pub struct Executor {
    registry: ToolRegistry,
    sandbox: SandboxDriver,
    max_output_chars: usize,
}

/// Metadata about one execution, for the caller (the Orchestrator) to
/// fold into a `tool_execute` trace step — the Executor itself does not
/// depend on the Ledger (cross-subsystem references are by data, not
/// shared ownership).
pub struct ExecutionOutcome {
    pub result: ToolExecutionResult,
    pub latency_ms: u64,
}

enum Dispatch {
    InProcess(serde_json::Value),
    Sandboxed { program: String, args: Vec<String> },
}

impl Executor {
    pub fn new(registry: ToolRegistry, sandbox: SandboxDriver, max_output_chars: usize) -> Self {
        Self {
            registry,
            sandbox,
            max_output_chars,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(&self, name: &str, args: &serde_json::Value) -> Result<ExecutionOutcome> {
        let start = Instant::now();

        if self.registry.lookup_spec(name).is_none() {
            return Err(Error::ToolNotFound(name.to_string()));
        }

        let dispatch = self
            .registry
            .with_handler(name, |_, handler| match handler {
                Handler::InProcess(h) => h.invoke(args).map(Dispatch::InProcess),
                Handler::Sandboxed(builder) => builder(args).map(|(program, args)| Dispatch::Sandboxed { program, args }),
            })
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))??;

        let (value, sandbox_used) = match dispatch {
            Dispatch::InProcess(v) => (v, false),
            Dispatch::Sandboxed { program, args } => (self.run_sandboxed(&program, &args).await?, true),
        };

        let (value, truncated) = self.cap_and_scrub(value);
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(ExecutionOutcome {
            result: ToolExecutionResult {
                status: "ok".to_string(),
                value: Some(value),
                error: None,
                truncated,
                sandbox_used,
            },
            latency_ms,
        })
    }

    async fn run_sandboxed(&self, program: &str, args: &[String]) -> Result<serde_json::Value> {
        let bypass = self.sandbox.fallback_allowed();
        if !self.sandbox.is_available() && !bypass {
            return Err(Error::SandboxUnavailable);
        }
        let outcome = self.sandbox.run(program, args, bypass).await?;

        if outcome.timed_out {
            return Err(Error::SandboxExecutionError(outcome.stderr));
        }
        match outcome.exit_code {
            Some(0) => Ok(serde_json::json!({ "stdout": outcome.stdout, "stderr": outcome.stderr })),
            Some(code) => Err(Error::SandboxExecutionError(format!(
                "exited with code {code}: {}",
                outcome.stderr
            ))),
            None => Err(Error::SandboxExecutionError(outcome.stderr)),
        }
    }

    fn cap_and_scrub(&self, value: serde_json::Value) -> (serde_json::Value, bool) {
        match value {
            serde_json::Value::String(s) => {
                let original_len = s.chars().count();
                let scrubbed = scrub_string(&s, self.max_output_chars);
                let truncated = original_len > self.max_output_chars;
                (serde_json::Value::String(scrubbed), truncated)
            }
            serde_json::Value::Object(map) => {
                let mut truncated = false;
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    let (capped, t) = self.cap_and_scrub(v);
                    truncated |= t;
                    out.insert(k, capped);
                }
                (serde_json::Value::Object(out), truncated)
            }
            other => (other, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{python_exec_args_builder, EchoHandler};
    use std::sync::Arc;
    use warden_domain::model::{ToolSafety, ToolSpec};

    fn sandbox_config(enabled: bool, fallback: bool) -> warden_domain::config::SandboxConfig {
        warden_domain::config::SandboxConfig {
            enabled,
            fallback,
            tool_dir: ".".to_string(),
            wall_clock_timeout_sec: 5,
            ..Default::default()
        }
    }

    fn echo_spec() -> ToolSpec {
        ToolSpec {
            name: "echo".to_string(),
            description: "echo".into(),
            safety: ToolSafety::Safe,
            parameters: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn executes_in_process_echo() {
        let registry = ToolRegistry::new();
        registry
            .register(echo_spec(), Handler::InProcess(Arc::new(EchoHandler)))
            .unwrap();
        let executor = Executor::new(registry, SandboxDriver::new(sandbox_config(false, false)), 4000);
        let outcome = executor
            .execute("echo", &serde_json::json!({ "message": "hi" }))
            .await
            .unwrap();
        assert_eq!(outcome.result.status, "ok");
        assert!(!outcome.result.sandbox_used);
        assert_eq!(
            outcome.result.value.unwrap()["output"],
            serde_json::json!("Echo: hi")
        );
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = ToolRegistry::new();
        let executor = Executor::new(registry, SandboxDriver::new(sandbox_config(false, false)), 4000);
        let err = executor.execute("nope", &serde_json::json!({})).await;
        assert!(matches!(err, Err(Error::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn sandboxed_tool_without_availability_or_fallback_fails() {
        let registry = ToolRegistry::new();
        let mut spec = echo_spec();
        spec.name = "python_exec".to_string();
        spec.safety = ToolSafety::Unsafe;
        registry
            .register(spec, Handler::Sandboxed(python_exec_args_builder()))
            .unwrap();
        let executor = Executor::new(registry, SandboxDriver::new(sandbox_config(false, false)), 4000);
        let err = executor
            .execute("python_exec", &serde_json::json!({ "code": "print(1)" }))
            .await;
        assert!(matches!(err, Err(Error::SandboxUnavailable)));
    }

    #[test]
    fn caps_and_scrubs_long_output() {
        let registry = ToolRegistry::new();
        let executor = Executor::new(registry, SandboxDriver::new(sandbox_config(false, false)), 5);
        let (value, truncated) = executor.cap_and_scrub(serde_json::json!("abcdefgh"));
        assert!(truncated);
        assert!(value.as_str().unwrap().len() <= 20);
    }
}
