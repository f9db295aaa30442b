//! Per-tool dispatch (spec §9's "tagged variants over a closed set of
//! built-in tools plus an extension point" re-architecting note).

use std::sync::Arc;
use warden_domain::error::Result;

/// An in-process tool implementation. Only safe tools may use this path
/// (spec §3 invariant: unsafe tools never run in-process when sandboxing
/// is required).
pub trait ToolHandler: Send + Sync {
    fn invoke(&self, args: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Builds the `(program, args)` invocation for a sandboxed tool from its
/// call arguments.
pub type SandboxArgsBuilder =
    Arc<dyn Fn(&serde_json::Value) -> Result<(String, Vec<String>)> + Send + Sync>;

pub enum Handler {
    InProcess(Arc<dyn ToolHandler>),
    Sandboxed(SandboxArgsBuilder),
}

/// The `echo` builtin: returns `"Echo: {message}"` (the literal example
/// from spec.md's scenario 1).
pub struct EchoHandler;

impl ToolHandler for EchoHandler {
    fn invoke(&self, args: &serde_json::Value) -> Result<serde_json::Value> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(serde_json::json!({ "output": format!("Echo: {message}") }))
    }
}

/// Builds the sandboxed `python_exec` invocation: `python3 -c <code>`.
pub fn python_exec_args_builder() -> SandboxArgsBuilder {
    Arc::new(|args: &serde_json::Value| {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                warden_domain::error::Error::MalformedRequest("missing 'code' argument".into())
            })?;
        Ok(("python3".to_string(), vec!["-c".to_string(), code.to_string()]))
    })
}
