use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Origin {
    User,
    Node(String),
}

impl Origin {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Node(name) => write!(f, "{}", name),
        }
    }
}

/// A single content block in a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "structured_output")]
    Structured { value: serde_json::Value },

    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub origin: Origin,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(origin: Origin, content: Vec<ContentBlock>) -> Self {
        Self {
            origin,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Origin::User, vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn node_text(node: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            Origin::node(node),
            vec![ContentBlock::Text { text: text.into() }],
        )
    }

    pub fn node_structured(node: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(Origin::node(node), vec![ContentBlock::Structured { value }])
    }

    /// Extract all text content from this turn.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool call blocks from this turn.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    pub fn structured(&self) -> Option<&serde_json::Value> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Structured { value } => Some(value),
            _ => None,
        })
    }

    pub fn has_tool_results(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

/// The authoritative output of a node or of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FinalOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl FinalOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    /// Text view of the output; structured values are rendered as JSON.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Structured(v) => v.to_string(),
        }
    }

    /// Look up a top-level field of a structured output.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.as_structured().and_then(|v| v.get(name))
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
}

impl StopReason {
    /// The model was cut off before finishing its answer.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::MaxTokens | Self::ContentFilter)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::ToolUse => "tool_use",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::ContentFilter => "content_filter",
        }
    }
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool call block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool call input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Everything a model needs to produce the next turn of a node.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Resolved node instructions, sent as system content.
    pub instructions: Option<String>,
    /// The full transcript so far.
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    /// JSON schema the final answer must satisfy, if any.
    pub response_schema: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    /// Name of the node that requested the call.
    pub node: String,
}

/// A pending approval checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub run_id: String,
    pub workflow: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Run started; metadata is the workflow's trace metadata.
    RunStarted {
        run_id: RunId,
        workflow: String,
        metadata: BTreeMap<String, String>,
    },
    /// The guardrail pipeline settled.
    GuardrailsEvaluated {
        run_id: RunId,
        tripwire_triggered: bool,
        checks: usize,
    },
    /// Router picked a branch.
    RouteSelected {
        run_id: RunId,
        classification: Option<String>,
        branch: String,
    },
    NodeStarted { run_id: RunId, node: String },
    /// Text streaming from the model.
    TextDelta { node: String, text: String },
    ToolStart {
        node: String,
        name: String,
        input: serde_json::Value,
    },
    ToolEnd {
        node: String,
        name: String,
        result: ToolResult,
    },
    NodeCompleted {
        run_id: RunId,
        node: String,
        new_turns: usize,
        input_tokens: u64,
        output_tokens: u64,
        elapsed_ms: u64,
    },
    ApprovalRequested { request: ApprovalRequest },
    ApprovalResolved { request_id: String, decision: String },
    /// Terminal event; `status` is `completed`, `aborted` or `pending`.
    RunFinished {
        run_id: RunId,
        status: String,
        elapsed_ms: u64,
    },
}

/// Reasoning effort forwarded to models that support it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Off => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_text_joins_text_blocks_only() {
        let turn = Turn::new(
            Origin::node("Retention Agent"),
            vec![
                ContentBlock::Text { text: "Hello ".into() },
                ContentBlock::ToolCall {
                    id: "call_1".into(),
                    name: "propose_retention_option".into(),
                    input: serde_json::json!({}),
                },
                ContentBlock::Text { text: "there".into() },
            ],
        );
        assert_eq!(turn.text(), "Hello there");
        assert_eq!(turn.tool_calls().len(), 1);
        assert_eq!(turn.tool_calls()[0].1, "propose_retention_option");
    }

    #[test]
    fn test_content_block_tags() {
        let block = ContentBlock::Structured {
            value: serde_json::json!({"classification": "return_item"}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "structured_output");

        let origin = serde_json::to_value(Origin::node("FAQ Agent")).unwrap();
        assert_eq!(origin, serde_json::json!({"kind": "node", "name": "FAQ Agent"}));
    }

    #[test]
    fn test_final_output_views() {
        let text = FinalOutput::Text("done".into());
        assert_eq!(text.as_text(), Some("done"));
        assert!(text.field("x").is_none());

        let structured = FinalOutput::Structured(serde_json::json!({"title": "Rust"}));
        assert_eq!(structured.field("title"), Some(&serde_json::json!("Rust")));
        assert_eq!(structured.to_text(), r#"{"title":"Rust"}"#);
    }

    #[test]
    fn test_truncating_stop_reasons() {
        assert!(StopReason::MaxTokens.is_truncated());
        assert!(StopReason::ContentFilter.is_truncated());
        assert!(!StopReason::EndTurn.is_truncated());
        assert!(!StopReason::ToolUse.is_truncated());
    }

    #[test]
    fn test_reasoning_effort_strings() {
        assert_eq!(ReasoningEffort::Low.as_str(), "low");
        assert_eq!(ReasoningEffort::default(), ReasoningEffort::Off);
    }
}
