use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming model invocation.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// A named capability a node may invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Resolves and runs named capabilities.
pub trait ToolExecutor: Send + Sync + 'static {
    /// Definitions for the named tools, in the order given.
    fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition>;

    /// Execute a named tool. Unknown or failing tools return an error.
    fn execute<'a>(
        &'a self,
        name: &'a str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'a, Result<ToolResult>>;
}
