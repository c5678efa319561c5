use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{Tool, ToolExecutor};
use switchyard_core::types::{ToolContext, ToolDefinition, ToolResult};

/// Registry of capabilities that nodes may call by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn definition(tool: &dyn Tool) -> ToolDefinition {
        ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        }
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| Self::definition(t.as_ref()))
            .collect()
    }

    /// Execute a tool by name under its own timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| SwitchyardError::ToolNotFound(name.to_string()))?;

        let timeout_secs = tool.timeout_secs();
        debug!(tool = %name, node = %ctx.node, "Executing tool");

        match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            tool.execute(input, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SwitchyardError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor for ToolRegistry {
    /// Unknown names are skipped; the call itself fails later with `ToolNotFound`.
    fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| Self::definition(t.as_ref()))
            .collect()
    }

    fn execute<'a>(
        &'a self,
        name: &'a str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'a, Result<ToolResult>> {
        Box::pin(ToolRegistry::execute(self, name, input, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::declared::DeclaredTool;
    use crate::builtin::function::FnTool;
    use switchyard_core::types::RunId;

    fn ctx() -> ToolContext {
        ToolContext {
            run_id: RunId::from_string("test"),
            node: "Test Node".into(),
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps past its timeout"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(ToolResult::success("late"))
            })
        }
        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry
            .execute("slow", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::ToolTimeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_definitions_for_keeps_requested_order() {
        let mut registry = ToolRegistry::new();
        registry.register(DeclaredTool::new("b_tool", "B", serde_json::json!({})));
        registry.register(FnTool::sync("a_tool", "A", serde_json::json!({}), |_| {
            Ok("a".to_string())
        }));

        let defs = registry.definitions_for(&["b_tool".into(), "nope".into(), "a_tool".into()]);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
        assert_eq!(registry.list(), vec!["a_tool", "b_tool"]);

        let result = ToolExecutor::execute(&registry, "a_tool", serde_json::json!({}), ctx())
            .await
            .unwrap();
        assert_eq!(result.content, "a");
    }
}
