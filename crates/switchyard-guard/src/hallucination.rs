use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::Result;
use switchyard_core::traits::LlmClient;

use crate::evaluator::GuardrailEvaluator;
use crate::judge::ask_json;
use crate::result::{GuardrailInfo, GuardrailKind, GuardrailResult};

#[derive(Debug, Deserialize)]
struct FactCheck {
    flagged: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    hallucination_type: Option<String>,
    #[serde(default)]
    hallucinated_statements: Vec<String>,
    #[serde(default)]
    verified_statements: Vec<String>,
}

/// Model-judged factuality check against a fixed reference text.
pub struct HallucinationGuardrail {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
    reference: String,
    threshold: f32,
}

impl HallucinationGuardrail {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        config: ModelConfig,
        reference: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self {
            llm,
            config,
            reference: reference.into(),
            threshold,
        }
    }

    fn instructions(&self) -> String {
        format!(
            r#"You are a fact checker. Compare every factual claim in the user's text against the reference below. A claim contradicted by or absent from the reference is a hallucination.

Reference:
{}

Respond with ONLY valid JSON:
{{
  "flagged": true | false,
  "confidence": 0.0-1.0,
  "reasoning": "brief explanation",
  "hallucination_type": "factual_error" | "unsupported_claim" | "none",
  "hallucinated_statements": ["..."],
  "verified_statements": ["..."]
}}"#,
            self.reference
        )
    }
}

impl GuardrailEvaluator for HallucinationGuardrail {
    fn name(&self) -> &str {
        "Hallucination Detection"
    }

    fn kind(&self) -> GuardrailKind {
        GuardrailKind::Hallucination
    }

    fn evaluate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>> {
        Box::pin(async move {
            let check: FactCheck =
                ask_json(self.llm.as_ref(), &self.config, &self.instructions(), text).await?;
            let confidence = check.confidence.clamp(0.0, 1.0);
            let info = GuardrailInfo {
                confidence: Some(confidence),
                threshold: Some(self.threshold),
                reasoning: check.reasoning,
                hallucination_type: check.hallucination_type,
                hallucinated_statements: check.hallucinated_statements,
                verified_statements: check.verified_statements,
                ..Default::default()
            };

            Ok(if check.flagged && confidence >= self.threshold {
                GuardrailResult::tripped(self.name(), self.kind(), info)
            } else {
                GuardrailResult::passed(self.name(), self.kind(), info)
            })
        })
    }
}
