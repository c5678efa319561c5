use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};
use crate::types::ReasoningEffort;

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    /// Named model overrides that workflow nodes can refer to by alias.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl AppConfig {
    /// Build a config around a single model with every other section defaulted.
    pub fn with_model(model: ModelConfig) -> Self {
        Self {
            model,
            fallback_models: vec![],
            models: HashMap::new(),
            run: RunConfig::default(),
            guardrails: GuardrailsConfig::default(),
            approval: ApprovalConfig::default(),
            log: None,
        }
    }

    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))
    }

    /// Resolve a model alias, falling back to the primary model.
    pub fn model_for(&self, alias: Option<&str>) -> &ModelConfig {
        alias
            .and_then(|a| self.models.get(a))
            .unwrap_or(&self.model)
    }

    /// Directory for JSONL run logs, if logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        Some(
            log.log_dir
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(|| PathBuf::from("logs")),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub reasoning: ReasoningEffort,
    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ModelConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            top_p: None,
            reasoning: ReasoningEffort::Off,
            extra_headers: HashMap::new(),
            retry: None,
        }
    }

    pub fn with_reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning = effort;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Limits applied to every node invocation of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Model turns allowed per node invocation (tool loops included).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Timeout for a single model call.
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    /// Feed tool failures back to the model instead of failing the run.
    #[serde(default)]
    pub tolerate_tool_errors: bool,
    /// Also run the guardrail pipeline over each node's final text.
    #[serde(default)]
    pub guard_agent_output: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            model_timeout_secs: default_model_timeout(),
            tolerate_tool_errors: false,
            guard_agent_output: false,
        }
    }
}

fn default_max_turns() -> usize { 10 }
fn default_model_timeout() -> u64 { 120 }

/// Guardrail pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Checks that run before the first node. Empty means the workflow decides.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Per-evaluator timeout.
    #[serde(default = "default_guard_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub jailbreak: JailbreakConfig,
    #[serde(default)]
    pub pii: PiiConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub hallucination: HallucinationConfig,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![],
            timeout_secs: default_guard_timeout(),
            jailbreak: JailbreakConfig::default(),
            pii: PiiConfig::default(),
            moderation: ModerationConfig::default(),
            hallucination: HallucinationConfig::default(),
        }
    }
}

fn default_guard_timeout() -> u64 { 30 }
fn default_confidence_threshold() -> f32 { 0.7 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailbreakConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Ask a model after the pattern heuristics find nothing.
    #[serde(default = "default_true")]
    pub use_model: bool,
    /// Model alias from `[models]`; the primary model when absent.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for JailbreakConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            use_model: true,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiConfig {
    /// Entity types to detect. Empty means all supported types.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Trip on detection instead of masking.
    #[serde(default)]
    pub block: bool,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            entities: vec![],
            block: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Category name to blocked terms (case-insensitive, whole word).
    #[serde(default = "ModerationConfig::default_categories")]
    pub categories: HashMap<String, Vec<String>>,
}

impl ModerationConfig {
    pub fn default_categories() -> HashMap<String, Vec<String>> {
        let mut categories = HashMap::new();
        categories.insert(
            "violence".to_string(),
            vec!["kill".to_string(), "murder".to_string(), "bomb".to_string()],
        );
        categories.insert(
            "self-harm".to_string(),
            vec!["suicide".to_string(), "self-harm".to_string()],
        );
        categories.insert(
            "harassment".to_string(),
            vec!["idiot".to_string(), "moron".to_string()],
        );
        categories
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            categories: Self::default_categories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HallucinationConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Reference knowledge the text is checked against.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            reference: None,
            model: None,
        }
    }
}

/// How approval checkpoints are answered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    #[default]
    Auto,
    Deny,
    Prompt,
    Policy,
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "deny" => Ok(Self::Deny),
            "prompt" => Ok(Self::Prompt),
            "policy" => Ok(Self::Policy),
            other => Err(format!("unknown approval mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub mode: ApprovalMode,
    /// Seconds to wait for an interactive answer before deferring.
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
    /// Policy mode denies any checkpoint whose message contains one of these.
    #[serde(default)]
    pub deny_terms: Vec<String>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::Auto,
            timeout_secs: default_approval_timeout(),
            deny_terms: vec![],
        }
    }
}

fn default_approval_timeout() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable JSONL run logs (default: true when section is present).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory for log files. Default: ./logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = run summary only, 2 = per node, 3 = per tool call (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> u8 { 2 }

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-5"
"#,
        )
        .unwrap();

        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.max_tokens, 4096);
        assert_eq!(config.run.max_turns, 10);
        assert!(!config.run.tolerate_tool_errors);
        assert_eq!(config.guardrails.jailbreak.confidence_threshold, 0.7);
        assert_eq!(config.approval.mode, ApprovalMode::Auto);
        assert!(config.log_dir().is_none());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("SWITCHYARD_TEST_KEY", "sk-expanded");
        let expanded = expand_env_vars("api_key = \"${SWITCHYARD_TEST_KEY}\"");
        assert_eq!(expanded, "api_key = \"sk-expanded\"");

        let untouched = expand_env_vars("x = \"${SWITCHYARD_SURELY_UNSET_VAR}\"");
        assert_eq!(untouched, "x = \"${SWITCHYARD_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_model_alias_resolution() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-5"

[models.fast]
model_id = "gpt-4.1-mini"
temperature = 1.0
"#,
        )
        .unwrap();

        assert_eq!(config.model_for(Some("fast")).model_id, "gpt-4.1-mini");
        assert_eq!(config.model_for(Some("missing")).model_id, "gpt-5");
        assert_eq!(config.model_for(None).model_id, "gpt-5");
    }

    #[test]
    fn test_approval_mode_from_str() {
        assert_eq!("Prompt".parse::<ApprovalMode>(), Ok(ApprovalMode::Prompt));
        assert!("maybe".parse::<ApprovalMode>().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::parse("[model\nmodel_id=").unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(_)));
    }
}
