//! Tool Registry (C3): register/lookup with enforced name uniqueness.

use crate::handler::Handler;
use parking_lot::RwLock;
use std::collections::HashMap;
use warden_domain::error::{Error, Result};
use warden_domain::model::ToolSpec;

struct Entry {
    spec: ToolSpec,
    handler: Handler,
}

#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool spec with its handler. Fails if the name is
    /// already taken. An unsafe spec must use a sandboxed handler.
    pub fn register(&self, spec: ToolSpec, handler: Handler) -> Result<()> {
        use warden_domain::model::ToolSafety;
        if spec.safety == ToolSafety::Unsafe && matches!(handler, Handler::InProcess(_)) {
            return Err(Error::Other(format!(
                "tool '{}' is marked unsafe and cannot use an in-process handler",
                spec.name
            )));
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&spec.name) {
            return Err(Error::Other(format!(
                "tool '{}' is already registered",
                spec.name
            )));
        }
        entries.insert(spec.name.clone(), Entry { spec, handler });
        Ok(())
    }

    pub fn lookup_spec(&self, name: &str) -> Option<ToolSpec> {
        self.entries.read().get(name).map(|e| e.spec.clone())
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.entries.read().values().map(|e| e.spec.clone()).collect()
    }

    pub(crate) fn with_handler<T>(&self, name: &str, f: impl FnOnce(&ToolSpec, &Handler) -> T) -> Option<T> {
        self.entries.read().get(name).map(|e| f(&e.spec, &e.handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;
    use std::sync::Arc;
    use warden_domain::model::ToolSafety;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: "test".into(),
            safety: ToolSafety::Safe,
            parameters: serde_json::json!({}),
        }
    }

    #[test]
    fn register_and_lookup() {
        let reg = ToolRegistry::new();
        reg.register(spec("echo"), Handler::InProcess(Arc::new(EchoHandler)))
            .unwrap();
        assert!(reg.lookup_spec("echo").is_some());
        assert!(reg.lookup_spec("missing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let reg = ToolRegistry::new();
        reg.register(spec("echo"), Handler::InProcess(Arc::new(EchoHandler)))
            .unwrap();
        assert!(reg
            .register(spec("echo"), Handler::InProcess(Arc::new(EchoHandler)))
            .is_err());
    }

    #[test]
    fn unsafe_tool_rejects_in_process_handler() {
        let reg = ToolRegistry::new();
        let mut s = spec("python_exec");
        s.safety = ToolSafety::Unsafe;
        assert!(reg
            .register(s, Handler::InProcess(Arc::new(EchoHandler)))
            .is_err());
    }
}
