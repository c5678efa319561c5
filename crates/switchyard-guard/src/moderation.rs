use std::collections::HashMap;

use futures::future::BoxFuture;
use regex::Regex;

use switchyard_core::config::ModerationConfig;
use switchyard_core::error::{Result, SwitchyardError};

use crate::evaluator::GuardrailEvaluator;
use crate::result::{GuardrailInfo, GuardrailKind, GuardrailResult};

/// Term-list content moderation. Trips when any category matches.
pub struct ModerationGuardrail {
    categories: Vec<(String, Regex)>,
}

impl ModerationGuardrail {
    pub fn new(categories: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut compiled = Vec::new();
        for (category, terms) in categories {
            if terms.is_empty() {
                continue;
            }
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t.trim()))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).map_err(|e| {
                SwitchyardError::Config(format!("moderation category {}: {}", category, e))
            })?;
            compiled.push((category.clone(), re));
        }
        compiled.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self {
            categories: compiled,
        })
    }

    pub fn from_config(config: &ModerationConfig) -> Result<Self> {
        Self::new(&config.categories)
    }

    /// Categories whose terms appear in `text`, sorted.
    pub fn flagged(&self, text: &str) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl GuardrailEvaluator for ModerationGuardrail {
    fn name(&self) -> &str {
        "Moderation"
    }

    fn kind(&self) -> GuardrailKind {
        GuardrailKind::Moderation
    }

    fn evaluate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>> {
        Box::pin(async move {
            let flagged_categories = self.flagged(text);
            let tripped = !flagged_categories.is_empty();
            let info = GuardrailInfo {
                flagged_categories,
                ..Default::default()
            };
            Ok(if tripped {
                GuardrailResult::tripped(self.name(), self.kind(), info)
            } else {
                GuardrailResult::passed(self.name(), self.kind(), info)
            })
        })
    }
}
