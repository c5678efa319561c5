use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Node contract errors
    #[error("Node '{node}' produced no final output")]
    MissingOutput { node: String },

    #[error("Node '{node}' output violates its contract: {}", issues.join("; "))]
    SchemaValidation { node: String, issues: Vec<String> },

    #[error("Node '{node}' exceeded max turns ({max_turns})")]
    MaxTurnsExceeded { node: String, max_turns: usize },

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // LLM / upstream errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Upstream service error: {service}: {message}")]
    Upstream { service: String, message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // Workflow definition errors
    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Invalid workflow '{workflow}': {message}")]
    InvalidWorkflow { workflow: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used when a fatal error becomes a run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A node broke its output contract (missing or invalid output).
    Contract,
    /// A capability failed or does not exist.
    Tool,
    /// A model or other external service failed or timed out.
    Upstream,
    /// The workflow definition or configuration is wrong.
    Definition,
    Internal,
}

impl SwitchyardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingOutput { .. }
            | Self::SchemaValidation { .. }
            | Self::MaxTurnsExceeded { .. } => ErrorKind::Contract,
            Self::ToolNotFound(_) | Self::ToolExecution { .. } | Self::ToolTimeout { .. } => {
                ErrorKind::Tool
            }
            Self::LlmRequest(_)
            | Self::LlmStream(_)
            | Self::LlmParse(_)
            | Self::Upstream { .. }
            | Self::Timeout { .. } => ErrorKind::Upstream,
            Self::UnsupportedProvider(_)
            | Self::UnknownBranch(_)
            | Self::InvalidWorkflow { .. }
            | Self::Config(_)
            | Self::ConfigNotFound(_) => ErrorKind::Definition,
            Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the whole run could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
