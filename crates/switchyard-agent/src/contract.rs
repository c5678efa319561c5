use serde::{Deserialize, Serialize};

use switchyard_core::error::{Result, SwitchyardError};

/// JSON type a contract field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Advertised to the model as an enum; not enforced here.
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Shape a node's final answer must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl OutputContract {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
            choices: vec![],
            description: None,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
            choices: vec![],
            description: None,
        });
        self
    }

    /// Add a required string field with advertised choices.
    pub fn choice(mut self, name: impl Into<String>, choices: &[&str]) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::String,
            required: true,
            choices: choices.iter().map(|c| c.to_string()).collect(),
            description: None,
        });
        self
    }

    /// JSON schema sent to the model.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for f in &self.fields {
            let mut prop = serde_json::json!({ "type": f.kind.as_str() });
            if !f.choices.is_empty() {
                prop["enum"] = serde_json::json!(f.choices);
            }
            if let Some(desc) = &f.description {
                prop["description"] = serde_json::json!(desc);
            }
            properties.insert(f.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        serde_json::json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Every problem with `value`, empty when it satisfies the contract.
    pub fn validate(&self, value: &serde_json::Value) -> Vec<String> {
        let Some(obj) = value.as_object() else {
            return vec!["Expected JSON object but got non-object".to_string()];
        };

        let mut issues = Vec::new();
        for f in &self.fields {
            match obj.get(&f.name) {
                None | Some(serde_json::Value::Null) if f.required => {
                    issues.push(format!("Missing required field '{}'", f.name));
                }
                Some(v) if !v.is_null() && !f.kind.matches(v) => {
                    issues.push(format!(
                        "Field '{}' should be {} but got {}",
                        f.name,
                        f.kind.as_str(),
                        json_type(v)
                    ));
                }
                _ => {}
            }
        }
        issues
    }

    /// Clean, parse and validate a node's raw final text.
    pub fn parse(&self, node: &str, raw: &str) -> Result<serde_json::Value> {
        let cleaned = clean_output(raw);
        let value: serde_json::Value =
            serde_json::from_str(&cleaned).map_err(|e| SwitchyardError::SchemaValidation {
                node: node.to_string(),
                issues: vec![format!("Output is not valid JSON: {}", e)],
            })?;

        let issues = self.validate(&value);
        if issues.is_empty() {
            Ok(value)
        } else {
            Err(SwitchyardError::SchemaValidation {
                node: node.to_string(),
                issues,
            })
        }
    }
}

fn json_type(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Strip markdown fences and surrounding whitespace.
///
/// Truncated JSON is left as is so that it fails to parse.
pub fn clean_output(output: &str) -> String {
    strip_code_fences(output)
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // skip an optional language tag
        let content_start = after.find('\n').map_or(0, |p| p + 1);
        let after = &after[content_start..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}
