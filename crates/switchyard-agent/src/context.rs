use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use switchyard_core::types::FinalOutput;

/// Per-run named values threaded into templated instructions.
///
/// Only the orchestrator mutates it, and only between node invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    data: HashMap<String, serde_json::Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Overwrites on conflict.
    pub fn merge(&mut self, other: &RunContext) {
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Copy the named fields of a node's output into the context.
    ///
    /// Structured outputs contribute matching top-level fields. Text outputs
    /// are stored whole under every key.
    pub fn ingest_output(&mut self, keys: &[String], output: &FinalOutput) {
        match output {
            FinalOutput::Structured(value) => {
                for key in keys {
                    if let Some(v) = value.get(key) {
                        self.data.insert(key.clone(), v.clone());
                    }
                }
            }
            FinalOutput::Text(text) => {
                for key in keys {
                    self.data
                        .insert(key.clone(), serde_json::Value::String(text.clone()));
                }
            }
        }
    }

    /// Display form of a value: strings bare, everything else as JSON.
    pub fn display(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Replace `{key}` placeholders with context values. Unknown keys are left as-is.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_key(&after[..close]) => {
                    let key = &after[..close];
                    match self.display(key) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }
}

fn is_key(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut ctx = RunContext::new();
        ctx.set_str("topic", "rust");
        ctx.set("num_tweets", serde_json::json!(2));

        assert_eq!(ctx.get_str("topic"), Some("rust"));
        assert_eq!(ctx.get("num_tweets"), Some(&serde_json::json!(2)));
        assert_eq!(ctx.display("num_tweets").as_deref(), Some("2"));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = RunContext::new();
        a.set_str("x", "1");
        let mut b = RunContext::new();
        b.set_str("x", "2");
        b.set_str("y", "3");
        a.merge(&b);
        assert_eq!(a.get_str("x"), Some("2"));
        assert_eq!(a.get_str("y"), Some("3"));
    }

    #[test]
    fn test_ingest_structured_and_text() {
        let mut ctx = RunContext::new();
        ctx.ingest_output(
            &["title".into(), "absent".into()],
            &FinalOutput::Structured(serde_json::json!({"title": "Rust 2024", "topic": "langs"})),
        );
        assert_eq!(ctx.get_str("title"), Some("Rust 2024"));
        assert!(ctx.get("topic").is_none());
        assert!(ctx.get("absent").is_none());

        ctx.ingest_output(&["summary".into()], &FinalOutput::Text("short".into()));
        assert_eq!(ctx.get_str("summary"), Some("short"));
    }

    #[test]
    fn test_render_placeholders() {
        let mut ctx = RunContext::new();
        ctx.set_str("topic", "ferris");
        ctx.set("num_tweets", serde_json::json!(2));

        assert_eq!(
            ctx.render("Write {num_tweets} tweets about {topic}."),
            "Write 2 tweets about ferris."
        );
        assert_eq!(ctx.render("keep {unknown} and {not a key}"), "keep {unknown} and {not a key}");
        assert_eq!(ctx.render("json {\"a\": 1}"), "json {\"a\": 1}");
        assert_eq!(ctx.render("dangling {topic"), "dangling {topic");
    }
}
