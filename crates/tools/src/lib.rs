//! Tool Registry & Executor (C3): a closed set of registered tools,
//! dispatched either in-process (safe tools) or through an isolated
//! sandbox (unsafe tools), with output capping and secret scrubbing
//! applied uniformly before results leave this crate.

pub mod executor;
pub mod handler;
pub mod registry;
pub mod sandbox;

pub use executor::{ExecutionOutcome, Executor};
pub use handler::{Handler, ToolHandler};
pub use registry::ToolRegistry;
pub use sandbox::SandboxDriver;

use std::sync::Arc;
use warden_domain::config::SandboxConfig;
use warden_domain::model::{ToolSafety, ToolSpec};

/// Builds an `Executor` with the `echo` (safe, in-process) and
/// `python_exec` (unsafe, sandboxed) builtins pre-registered, matching
/// the tools named in the end-to-end scenarios.
pub fn builtin_executor(sandbox_config: SandboxConfig) -> Executor {
    let max_output_chars = sandbox_config.max_output_chars;
    let registry = ToolRegistry::new();

    registry
        .register(
            ToolSpec {
                name: "echo".to_string(),
                description: "Echoes a message back, prefixed with \"Echo: \".".to_string(),
                safety: ToolSafety::Safe,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"],
                }),
            },
            Handler::InProcess(Arc::new(handler::EchoHandler)),
        )
        .expect("builtin registration cannot collide");

    registry
        .register(
            ToolSpec {
                name: "python_exec".to_string(),
                description: "Executes a snippet of Python code in the sandbox.".to_string(),
                safety: ToolSafety::Unsafe,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "code": { "type": "string" } },
                    "required": ["code"],
                }),
            },
            Handler::Sandboxed(handler::python_exec_args_builder()),
        )
        .expect("builtin registration cannot collide");

    Executor::new(registry, SandboxDriver::new(sandbox_config), max_output_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_executor_runs_echo() {
        let executor = builtin_executor(SandboxConfig::default());
        let outcome = executor
            .execute("echo", &serde_json::json!({ "message": "hi" }))
            .await
            .unwrap();
        assert_eq!(
            outcome.result.value.unwrap()["output"],
            serde_json::json!("Echo: hi")
        );
    }

    #[tokio::test]
    async fn builtin_executor_lists_both_tools() {
        let executor = builtin_executor(SandboxConfig::default());
        let names: Vec<_> = executor.registry().list().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"echo".to_string()));
        assert!(names.contains(&"python_exec".to_string()));
    }
}
