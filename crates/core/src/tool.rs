//! Tool and Toolset traits: how the chat loops reach external functions.
//!
//! The loops only depend on [`Toolset`]: a named-tool dispatcher that also
//! advertises the schemas sent to the model. [`ToolRegistry`] is the stock
//! implementation, backed by individually registered [`Tool`] objects.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ToolError;
use crate::progress::Progress;
use crate::provider::ToolDefinition;

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output content, as sent back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.output)
    }
}

/// A single callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Intermediate updates go to `progress`.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        progress: &Progress<serde_json::Value>,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Anything the chat loops can invoke tools through.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Tool schemas advertised to the model.
    fn available_tools(&self) -> Vec<ToolDefinition>;

    /// Invoke `name` with the raw, model-produced `arguments` string.
    async fn call_tool(
        &self,
        name: &str,
        call_id: &str,
        arguments: &str,
        progress: Progress<serde_json::Value>,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Toolset for ToolRegistry {
    fn available_tools(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn call_tool(
        &self,
        name: &str,
        call_id: &str,
        arguments: &str,
        progress: Progress<serde_json::Value>,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        // Some models send no arguments at all for parameterless tools
        let arguments = if arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("{name}: {e}")))?
        };

        debug!(tool = %name, call_id = %call_id, "Calling tool");
        tool.execute(arguments, &progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            progress: &Progress<serde_json::Value>,
        ) -> std::result::Result<ToolResult, ToolError> {
            progress.emit(serde_json::json!({"stage": "echoing"}));
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::text(text))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_advertises_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.available_tools();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn call_tool_parses_arguments_and_forwards_progress() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let updates = Arc::new(Mutex::new(Vec::new()));
        let progress = {
            let updates = Arc::clone(&updates);
            Progress::new(move |u| updates.lock().unwrap().push(u))
        };

        let result = registry
            .call_tool("echo", "call_1", r#"{"text":"hello world"}"#, progress)
            .await
            .unwrap();
        assert_eq!(result.to_string(), "hello world");
        assert_eq!(
            *updates.lock().unwrap(),
            vec![serde_json::json!({"stage": "echoing"})]
        );
    }

    #[tokio::test]
    async fn call_tool_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .call_tool("nonexistent", "call_1", "{}", Progress::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn call_tool_rejects_malformed_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry
            .call_tool("echo", "call_1", "{not json", Progress::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn call_tool_accepts_empty_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry
            .call_tool("echo", "call_1", "", Progress::noop())
            .await
            .unwrap();
        assert_eq!(result.output, "");
    }
}
