use std::collections::BTreeMap;

use futures::future::BoxFuture;
use regex::Regex;

use switchyard_core::config::PiiConfig;
use switchyard_core::error::{Result, SwitchyardError};

use crate::evaluator::GuardrailEvaluator;
use crate::result::{GuardrailInfo, GuardrailKind, GuardrailResult};

/// Supported entity types, in masking order.
pub const ENTITIES: &[(&str, &str)] = &[
    ("EMAIL_ADDRESS", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
    ("CREDIT_CARD", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{1,4}\b"),
    ("US_SSN", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("PHONE_NUMBER", r"(?:\+1[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b"),
    ("IP_ADDRESS", r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b"),
];

/// Regex-based PII detector.
///
/// In mask mode matches are replaced with `<ENTITY>` in `anonymized_text`
/// and the check passes. In block mode any match trips.
pub struct PiiGuardrail {
    detectors: Vec<(String, Regex)>,
    block: bool,
}

impl PiiGuardrail {
    /// `entities` empty means every supported type.
    pub fn new(entities: &[String], block: bool) -> Result<Self> {
        let mut detectors = Vec::new();
        for (entity, pattern) in ENTITIES {
            if !entities.is_empty() && !entities.iter().any(|e| e.eq_ignore_ascii_case(entity)) {
                continue;
            }
            let re = Regex::new(pattern)
                .map_err(|e| SwitchyardError::Config(format!("PII pattern {}: {}", entity, e)))?;
            detectors.push((entity.to_string(), re));
        }

        if let Some(unknown) = entities
            .iter()
            .find(|e| !ENTITIES.iter().any(|(known, _)| e.eq_ignore_ascii_case(known)))
        {
            return Err(SwitchyardError::Config(format!(
                "unsupported PII entity: {}",
                unknown
            )));
        }

        Ok(Self { detectors, block })
    }

    pub fn from_config(config: &PiiConfig) -> Result<Self> {
        Self::new(&config.entities, config.block)
    }

    /// Detect entities and produce the masked text.
    pub fn scan(&self, text: &str) -> (BTreeMap<String, Vec<String>>, String) {
        let mut detected = BTreeMap::new();
        let mut masked = text.to_string();

        for (entity, re) in &self.detectors {
            let matches: Vec<String> = re
                .find_iter(&masked)
                .map(|m| m.as_str().to_string())
                .filter(|m| entity != "CREDIT_CARD" || luhn_valid(m))
                .collect();
            if matches.is_empty() {
                continue;
            }
            let placeholder = format!("<{}>", entity);
            for m in &matches {
                masked = masked.replace(m.as_str(), &placeholder);
            }
            detected.insert(entity.clone(), matches);
        }

        (detected, masked)
    }
}

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

impl GuardrailEvaluator for PiiGuardrail {
    fn name(&self) -> &str {
        "Contains PII"
    }

    fn kind(&self) -> GuardrailKind {
        GuardrailKind::Pii
    }

    fn evaluate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>> {
        Box::pin(async move {
            let (detected_entities, masked) = self.scan(text);
            let found = !detected_entities.is_empty();
            let info = GuardrailInfo {
                anonymized_text: (found && !self.block).then_some(masked),
                detected_entities,
                ..Default::default()
            };

            Ok(if found && self.block {
                GuardrailResult::tripped(self.name(), self.kind(), info)
            } else {
                GuardrailResult::passed(self.name(), self.kind(), info)
            })
        })
    }
}
