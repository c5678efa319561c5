use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::Result;
use switchyard_core::traits::LlmClient;

use crate::evaluator::GuardrailEvaluator;
use crate::hallucination::HallucinationGuardrail;
use crate::jailbreak::JailbreakGuardrail;
use crate::moderation::ModerationGuardrail;
use crate::pii::PiiGuardrail;
use crate::report::{build_failure_report, has_tripwire, safe_text, GuardrailReport};
use crate::result::{GuardrailKind, GuardrailResult};

/// Merged verdict of one guardrail pass.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailOutcome {
    pub tripwire_triggered: bool,
    pub safe_text: String,
    /// Present only when tripped.
    pub report: Option<GuardrailReport>,
    /// Number of evaluators that ran.
    pub checks: usize,
    /// Number of evaluators that failed to execute.
    pub execution_failures: usize,
}

/// Runs the enabled evaluators concurrently and merges their results.
pub struct GuardrailPipeline {
    evaluators: Vec<Arc<dyn GuardrailEvaluator>>,
    timeout: Duration,
}

impl GuardrailPipeline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            evaluators: Vec::new(),
            timeout,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn GuardrailEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn add(&mut self, evaluator: Arc<dyn GuardrailEvaluator>) {
        self.evaluators.push(evaluator);
    }

    pub fn kinds(&self) -> Vec<GuardrailKind> {
        self.evaluators.iter().map(|e| e.kind()).collect()
    }

    /// Build the pipeline with every built-in evaluator the config allows.
    ///
    /// The hallucination check is only added when reference text is configured.
    pub fn from_config(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let guard = &config.guardrails;
        let mut pipeline = Self::new(Duration::from_secs(guard.timeout_secs));

        pipeline.add(Arc::new(PiiGuardrail::from_config(&guard.pii)?));
        pipeline.add(Arc::new(ModerationGuardrail::from_config(&guard.moderation)?));

        let mut jailbreak = JailbreakGuardrail::new(guard.jailbreak.confidence_threshold);
        if guard.jailbreak.use_model {
            let model = config.model_for(guard.jailbreak.model.as_deref()).clone();
            jailbreak = jailbreak.with_judge(llm.clone(), model);
        }
        pipeline.add(Arc::new(jailbreak));

        if let Some(reference) = &guard.hallucination.reference {
            let model = config.model_for(guard.hallucination.model.as_deref()).clone();
            pipeline.add(Arc::new(HallucinationGuardrail::new(
                llm,
                model,
                reference.clone(),
                guard.hallucination.confidence_threshold,
            )));
        }

        Ok(pipeline)
    }

    /// Run every evaluator whose kind is in `enabled`.
    ///
    /// Waits for all of them to settle. Errors and timeouts are recorded as
    /// execution failures and never trip.
    pub async fn evaluate(&self, raw_text: &str, enabled: &[GuardrailKind]) -> GuardrailOutcome {
        let results = self.run_all(raw_text, enabled).await;
        Self::merge(raw_text, &results)
    }

    /// Run the enabled evaluators and return their raw results in registration order.
    pub async fn run_all(&self, raw_text: &str, enabled: &[GuardrailKind]) -> Vec<GuardrailResult> {
        let selected: Vec<&Arc<dyn GuardrailEvaluator>> = self
            .evaluators
            .iter()
            .filter(|e| enabled.contains(&e.kind()))
            .collect();

        let start = Instant::now();
        let futs = selected.iter().map(|evaluator| {
            let timeout = self.timeout;
            async move {
                let name = evaluator.name().to_string();
                let kind = evaluator.kind();
                match tokio::time::timeout(timeout, evaluator.evaluate(raw_text)).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        warn!(guardrail = %name, error = %e, "Guardrail failed to execute");
                        GuardrailResult::execution_error(name, kind, e.to_string())
                    }
                    Err(_) => {
                        warn!(guardrail = %name, timeout_secs = timeout.as_secs(), "Guardrail timed out");
                        GuardrailResult::execution_error(
                            name,
                            kind,
                            format!("timed out after {}s", timeout.as_secs()),
                        )
                    }
                }
            }
        });
        let results = futures::future::join_all(futs).await;

        debug!(
            checks = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Guardrails settled"
        );
        results
    }

    /// Combine one pass of results into an outcome.
    pub fn merge(raw_text: &str, results: &[GuardrailResult]) -> GuardrailOutcome {
        let tripwire_triggered = has_tripwire(results);
        let report = tripwire_triggered.then(|| build_failure_report(results));
        if let Some(report) = &report {
            info!(failed = ?report.failed_checks(), "Guardrail tripwire triggered");
        }

        GuardrailOutcome {
            tripwire_triggered,
            safe_text: safe_text(results, raw_text),
            report,
            checks: results.len(),
            execution_failures: results.iter().filter(|r| r.execution_failed).count(),
        }
    }
}
