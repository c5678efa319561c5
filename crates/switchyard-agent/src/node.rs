use std::sync::Arc;

use serde::Serialize;

use switchyard_core::config::{AppConfig, ModelConfig};
use switchyard_core::types::{FinalOutput, ReasoningEffort, Turn};

use crate::context::RunContext;
use crate::contract::OutputContract;

type TemplateFn = Arc<dyn Fn(&RunContext) -> String + Send + Sync>;

/// Where a node's instructions come from.
#[derive(Clone)]
pub enum InstructionSource {
    Static(String),
    /// Evaluated against the run context right before each invocation.
    Template(TemplateFn),
}

impl InstructionSource {
    pub fn template<F>(f: F) -> Self
    where
        F: Fn(&RunContext) -> String + Send + Sync + 'static,
    {
        Self::Template(Arc::new(f))
    }

    /// Template rendered from `{key}` placeholders.
    pub fn format(template: impl Into<String>) -> Self {
        let template = template.into();
        Self::template(move |ctx| ctx.render(&template))
    }

    pub fn resolve(&self, ctx: &RunContext) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Template(f) => f(ctx),
        }
    }
}

impl std::fmt::Debug for InstructionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Template(_) => f.write_str("Template(..)"),
        }
    }
}

impl From<&str> for InstructionSource {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for InstructionSource {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

/// Per-node model settings layered over the configured model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelSettings {
    /// Alias into `[models]`; the primary model when absent or unknown.
    pub alias: Option<String>,
    pub reasoning: Option<ReasoningEffort>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn resolve(&self, config: &AppConfig) -> ModelConfig {
        let mut model = config.model_for(self.alias.as_deref()).clone();
        if let Some(reasoning) = self.reasoning {
            model.reasoning = reasoning;
        }
        if let Some(temperature) = self.temperature {
            model.temperature = Some(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            model.max_tokens = max_tokens;
        }
        model
    }
}

/// Immutable descriptor of one model-backed step.
#[derive(Debug, Clone)]
pub struct AgentNode {
    /// Unique within a workflow; also the transcript origin of its turns.
    pub name: String,
    pub instructions: InstructionSource,
    /// `None` means free-text output.
    pub output: Option<OutputContract>,
    /// Capability names the node may call.
    pub tools: Vec<String>,
    pub model: ModelSettings,
    /// Fields of the output copied into the run context.
    pub output_keys: Vec<String>,
    /// Overrides `[run] max_turns`.
    pub max_turns: Option<usize>,
}

impl AgentNode {
    pub fn new(name: impl Into<String>, instructions: impl Into<InstructionSource>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            output: None,
            tools: vec![],
            model: ModelSettings::default(),
            output_keys: vec![],
            max_turns: None,
        }
    }

    pub fn with_output(mut self, contract: OutputContract) -> Self {
        self.output = Some(contract);
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_model(mut self, alias: impl Into<String>) -> Self {
        self.model.alias = Some(alias.into());
        self
    }

    pub fn with_reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.model.reasoning = Some(effort);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.model.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.model.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_keys(mut self, keys: &[&str]) -> Self {
        self.output_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = Some(turns);
        self
    }
}

/// What one node invocation produced.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Every turn appended during the invocation, in generation order.
    pub new_turns: Vec<Turn>,
    pub final_output: FinalOutput,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
