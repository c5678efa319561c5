use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_guard::{GuardrailEvaluator, GuardrailInfo, GuardrailKind, GuardrailResult};

/// Evaluator that always returns the same verdict.
pub struct StaticEvaluator {
    result: GuardrailResult,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticEvaluator {
    pub fn new(result: GuardrailResult) -> Self {
        Self {
            result,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn passing(name: &str, kind: GuardrailKind) -> Self {
        Self::new(GuardrailResult::passed(name, kind, GuardrailInfo::default()))
    }

    pub fn tripping(name: &str, kind: GuardrailKind) -> Self {
        Self::new(GuardrailResult::tripped(name, kind, GuardrailInfo::default()))
    }

    /// Passes, offering `text` as the anonymized input.
    pub fn anonymizing(name: &str, kind: GuardrailKind, text: &str) -> Self {
        Self::new(GuardrailResult::passed(
            name,
            kind,
            GuardrailInfo {
                anonymized_text: Some(text.to_string()),
                ..Default::default()
            },
        ))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GuardrailEvaluator for StaticEvaluator {
    fn name(&self) -> &str {
        &self.result.name
    }

    fn kind(&self) -> GuardrailKind {
        self.result.kind
    }

    fn evaluate<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.result.clone())
        })
    }
}

/// Evaluator that cannot run.
pub struct FailingEvaluator {
    name: String,
    kind: GuardrailKind,
}

impl FailingEvaluator {
    pub fn new(name: &str, kind: GuardrailKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

impl GuardrailEvaluator for FailingEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GuardrailKind {
        self.kind
    }

    fn evaluate<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>> {
        Box::pin(async move {
            Err(SwitchyardError::Upstream {
                service: self.name.clone(),
                message: "evaluator unavailable".into(),
            })
        })
    }
}
