use serde::{Deserialize, Serialize};

use switchyard_core::error::{ErrorKind, SwitchyardError};
use switchyard_core::transcript::Transcript;
use switchyard_core::types::{FinalOutput, RunId};
use switchyard_guard::GuardrailReport;

/// Message shown for any abort that is not a guardrail trip.
pub const GENERIC_FAILURE: &str = "Something went wrong.  Try again later.";

/// Why a run stopped without completing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    Guardrail { report: GuardrailReport },
    Fatal { kind: ErrorKind, detail: String },
}

/// Terminal value of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { output: FinalOutput },
    Aborted { reason: AbortReason, message: String },
    /// Waiting on an approval that was deferred.
    Pending { approval_message: String },
}

impl RunOutcome {
    pub fn completed(output: FinalOutput) -> Self {
        Self::Completed { output }
    }

    pub fn guardrail(report: GuardrailReport) -> Self {
        Self::Aborted {
            reason: AbortReason::Guardrail { report },
            message: GENERIC_FAILURE.to_string(),
        }
    }

    pub fn fatal(error: &SwitchyardError) -> Self {
        Self::Aborted {
            reason: AbortReason::Fatal {
                kind: error.kind(),
                detail: error.to_string(),
            },
            message: GENERIC_FAILURE.to_string(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Aborted { .. } => "aborted",
            Self::Pending { .. } => "pending",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn output(&self) -> Option<&FinalOutput> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub fn guardrail_report(&self) -> Option<&GuardrailReport> {
        match self {
            Self::Aborted {
                reason: AbortReason::Guardrail { report },
                ..
            } => Some(report),
            _ => None,
        }
    }

    /// Error class of a fatal abort.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Aborted {
                reason: AbortReason::Fatal { kind, .. },
                ..
            } => Some(*kind),
            _ => None,
        }
    }
}

/// A run's outcome together with what led to it.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub transcript: Transcript,
    pub classification: Option<String>,
    pub branch: Option<String>,
    /// Transcript length after each node invocation, in order.
    pub checkpoints: Vec<usize>,
}
