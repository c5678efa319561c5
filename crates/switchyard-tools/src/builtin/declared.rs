use futures::future::BoxFuture;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::Tool;
use switchyard_core::types::{ToolContext, ToolResult};

/// A tool that is advertised to the model but has no implementation.
///
/// Calling it fails with `ToolExecution`.
pub struct DeclaredTool {
    name: String,
    description: String,
    schema: serde_json::Value,
}

impl DeclaredTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

impl Tool for DeclaredTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            Err(SwitchyardError::ToolExecution {
                tool: self.name.clone(),
                message: "tool is declared but not implemented".to_string(),
            })
        })
    }
}
