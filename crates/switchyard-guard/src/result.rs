use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The role an evaluator plays in the failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailKind {
    Pii,
    Moderation,
    Jailbreak,
    Hallucination,
    Custom,
}

impl GuardrailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Moderation => "moderation",
            Self::Jailbreak => "jailbreak",
            Self::Hallucination => "hallucination",
            Self::Custom => "custom",
        }
    }

    /// Parse a configured check list such as `["jailbreak", "Contains PII"]`.
    pub fn parse_list(names: &[String]) -> switchyard_core::error::Result<Vec<Self>> {
        names
            .iter()
            .map(|n| n.parse().map_err(switchyard_core::error::SwitchyardError::Config))
            .collect()
    }
}

impl std::fmt::Display for GuardrailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GuardrailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "pii" | "contains_pii" => Ok(Self::Pii),
            "moderation" => Ok(Self::Moderation),
            "jailbreak" => Ok(Self::Jailbreak),
            "hallucination" | "hallucination_detection" => Ok(Self::Hallucination),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown guardrail: {}", other)),
        }
    }
}

/// Evaluator-specific diagnostics. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailInfo {
    /// Processed text an evaluator vouches for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_text: Option<String>,
    /// Input with detected entities replaced by placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymized_text: Option<String>,
    /// Entity type to the matched values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detected_entities: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hallucination_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hallucinated_statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verified_statements: Vec<String>,
    /// Set when the evaluator could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One evaluator's verdict for one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub name: String,
    pub kind: GuardrailKind,
    pub tripwire_triggered: bool,
    /// The evaluator errored or timed out. Never trips on its own.
    pub execution_failed: bool,
    pub info: GuardrailInfo,
}

impl GuardrailResult {
    pub fn passed(name: impl Into<String>, kind: GuardrailKind, info: GuardrailInfo) -> Self {
        Self {
            name: name.into(),
            kind,
            tripwire_triggered: false,
            execution_failed: false,
            info,
        }
    }

    pub fn tripped(name: impl Into<String>, kind: GuardrailKind, info: GuardrailInfo) -> Self {
        Self {
            name: name.into(),
            kind,
            tripwire_triggered: true,
            execution_failed: false,
            info,
        }
    }

    pub fn execution_error(
        name: impl Into<String>,
        kind: GuardrailKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            tripwire_triggered: false,
            execution_failed: true,
            info: GuardrailInfo {
                error: Some(error.into()),
                ..Default::default()
            },
        }
    }
}
