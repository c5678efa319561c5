//! Pure functions over one pass of guardrail results.

use serde::{Deserialize, Serialize};

use crate::result::{GuardrailKind, GuardrailResult};

/// True iff any evaluator tripped.
pub fn has_tripwire(results: &[GuardrailResult]) -> bool {
    results.iter().any(|r| r.tripwire_triggered)
}

/// Text to continue with: the first `checked_text`, else the first
/// `anonymized_text`, else `fallback` unchanged.
pub fn safe_text(results: &[GuardrailResult], fallback: &str) -> String {
    results
        .iter()
        .find_map(|r| r.info.checked_text.as_deref())
        .or_else(|| {
            results
                .iter()
                .find_map(|r| r.info.anonymized_text.as_deref())
        })
        .unwrap_or(fallback)
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiReport {
    pub failed: bool,
    /// `ENTITY:count` for every entity type with at least one match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_counts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JailbreakReport {
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallucinationReport {
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hallucination_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hallucinated_statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verified_statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The only guardrail diagnostic surfaced to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub pii: PiiReport,
    pub moderation: ModerationReport,
    pub jailbreak: JailbreakReport,
    pub hallucination: HallucinationReport,
}

impl GuardrailReport {
    /// Names of the roles that failed, in report order.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        [
            ("pii", self.pii.failed),
            ("moderation", self.moderation.failed),
            ("jailbreak", self.jailbreak.failed),
            ("hallucination", self.hallucination.failed),
        ]
        .into_iter()
        .filter_map(|(name, failed)| failed.then_some(name))
        .collect()
    }
}

fn first_of(results: &[GuardrailResult], kind: GuardrailKind) -> Option<&GuardrailResult> {
    results.iter().find(|r| r.kind == kind)
}

/// Errors are reported only for evaluators that failed to execute.
fn execution_error(r: &GuardrailResult) -> Option<String> {
    if r.execution_failed {
        Some(
            r.info
                .error
                .clone()
                .unwrap_or_else(|| "evaluator failed".to_string()),
        )
    } else {
        None
    }
}

/// Fold results into the fixed four-role report. Roles without an evaluator
/// report `failed: false` and nothing else.
pub fn build_failure_report(results: &[GuardrailResult]) -> GuardrailReport {
    let mut report = GuardrailReport::default();

    if let Some(r) = first_of(results, GuardrailKind::Pii) {
        let detected_counts: Vec<String> = r
            .info
            .detected_entities
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(entity, values)| format!("{}:{}", entity, values.len()))
            .collect();
        report.pii = PiiReport {
            failed: r.tripwire_triggered || !detected_counts.is_empty(),
            detected_counts,
            error: execution_error(r),
        };
    }

    if let Some(r) = first_of(results, GuardrailKind::Moderation) {
        report.moderation = ModerationReport {
            failed: r.tripwire_triggered || !r.info.flagged_categories.is_empty(),
            flagged_categories: r.info.flagged_categories.clone(),
            error: execution_error(r),
        };
    }

    if let Some(r) = first_of(results, GuardrailKind::Jailbreak) {
        report.jailbreak = JailbreakReport {
            failed: r.tripwire_triggered,
            confidence: r.info.confidence,
            error: execution_error(r),
        };
    }

    if let Some(r) = first_of(results, GuardrailKind::Hallucination) {
        report.hallucination = HallucinationReport {
            failed: r.tripwire_triggered,
            reasoning: r.info.reasoning.clone(),
            hallucination_type: r.info.hallucination_type.clone(),
            hallucinated_statements: r.info.hallucinated_statements.clone(),
            verified_statements: r.info.verified_statements.clone(),
            error: execution_error(r),
        };
    }

    report
}
