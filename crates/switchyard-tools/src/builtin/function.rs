use std::sync::Arc;

use futures::future::BoxFuture;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::Tool;
use switchyard_core::types::{ToolContext, ToolResult};

type Handler =
    Arc<dyn Fn(serde_json::Value, ToolContext) -> BoxFuture<'static, Result<ToolResult>> + Send + Sync>;

/// A tool backed by a closure.
pub struct FnTool {
    name: String,
    description: String,
    schema: serde_json::Value,
    timeout_secs: u64,
    handler: Handler,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> BoxFuture<'static, Result<ToolResult>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            timeout_secs: 30,
            handler: Arc::new(handler),
        }
    }

    /// Wrap a synchronous function. An `Err` message becomes a `ToolExecution` error.
    pub fn sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        f: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let tool_name = name.clone();
        let f = Arc::new(f);
        Self::new(name, description, schema, move |input, _ctx| {
            let f = f.clone();
            let tool = tool_name.clone();
            Box::pin(async move {
                f(input)
                    .map(ToolResult::success)
                    .map_err(|message| SwitchyardError::ToolExecution { tool, message })
            })
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Tool for FnTool {
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
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        (self.handler)(input, ctx)
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
