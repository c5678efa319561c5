use std::sync::Arc;
use std::time::Duration;

use switchyard_agent::approval::ApprovalGate;
use switchyard_agent::orchestrator::{Orchestrator, OrchestratorBuilder};
use switchyard_core::config::{AppConfig, ModelConfig};
use switchyard_core::traits::{LlmClient, ToolExecutor};
use switchyard_guard::GuardrailPipeline;

/// Config for tests: a single `test-model`, short node loops.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::with_model(ModelConfig::new("test-model"));
    config.run.max_turns = 4;
    config.run.model_timeout_secs = 5;
    config
}

/// Empty guardrail pipeline with a short per-evaluator timeout.
pub fn empty_pipeline() -> GuardrailPipeline {
    GuardrailPipeline::new(Duration::from_secs(1))
}

/// Orchestrator wired to the given mocks.
pub fn test_orchestrator(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    guardrails: GuardrailPipeline,
    approval: Arc<dyn ApprovalGate>,
    tools: Option<Arc<dyn ToolExecutor>>,
) -> Orchestrator {
    let mut builder = OrchestratorBuilder::new(config, llm)
        .guardrails(guardrails)
        .approval(approval);
    if let Some(tools) = tools {
        builder = builder.tools(tools);
    }
    builder
        .build()
        .expect("explicit guardrails and approval never fail to build")
}
