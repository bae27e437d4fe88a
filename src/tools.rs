//! Tool Registry (C10): the Agent's uniform dispatch surface over its pipeline
//! steps. Each tool is named, carries a JSON-Schema-shaped description for
//! introspection, and is invoked through the same `execute(name, input)` path
//! regardless of what it wraps underneath.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures::Future;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self { name: name.into(), description: description.into(), input_schema }
    }
}

/// Registry of Agent tools. Registration is construction-time only and
/// idempotent in the sense that two tools can never silently share a name: a
/// second `register` call for an already-registered name is a logical error,
/// not a silent overwrite, since that would hide a wiring bug.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, (ToolSpec, ToolHandler)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec, handler: ToolHandler) -> Result<()> {
        if self.tools.contains_key(&spec.name) {
            return Err(Error::logical(format!("tool '{}' already registered", spec.name)));
        }
        self.tools.insert(spec.name.clone(), (spec, handler));
        Ok(())
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|(spec, _)| spec)
    }

    pub fn specs(&self) -> Vec<&ToolSpec> {
        self.tools.values().map(|(spec, _)| spec).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let (_, handler) = self
            .tools
            .get(name)
            .ok_or_else(|| Error::logical(format!("unknown tool: {name}")))?;
        handler(input).await
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

/// Helper for defining a handler from an async closure without writing the
/// boxing boilerplate at every call site.
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |input| Box::pin(f(input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_spec() -> ToolSpec {
        ToolSpec::new("echo", "returns its input unchanged", serde_json::json!({"type": "object"}))
    }

    #[tokio::test]
    async fn registered_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec(), handler(|input| async move { Ok(input) })).unwrap();

        let result = registry.execute("echo", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"a": 1}));
    }

    #[test]
    fn duplicate_registration_is_a_logical_error() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec(), handler(|input| async move { Ok(input) })).unwrap();
        let second = registry.register(echo_spec(), handler(|input| async move { Ok(input) }));
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_logical_error() {
        let registry = ToolRegistry::new();
        let result = registry.execute("missing", Value::Null).await;
        assert!(result.is_err());
    }

    #[test]
    fn specs_reflect_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec(), handler(|input| async move { Ok(input) })).unwrap();
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
