use serde::de::DeserializeOwned;
use tracing::debug;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::{ChatRequest, Turn};
use switchyard_llm::collect_completion;

/// Ask a model for a JSON verdict and parse it into `T`.
pub(crate) async fn ask_json<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    instructions: &str,
    text: &str,
) -> Result<T> {
    let request = ChatRequest::new(vec![Turn::user(text)]).with_instructions(instructions);
    let stream = llm.chat_stream(config, request).await?;
    let completion = collect_completion(stream, |_| {}).await?;
    debug!(response = %completion.text, "Judge responded");

    serde_json::from_str(extract_json(&completion.text)).map_err(|e| {
        SwitchyardError::LlmParse(format!("judge returned unparseable verdict: {}", e))
    })
}

/// Pull a JSON object out of a model reply that may be fenced or chatty.
pub(crate) fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Verdict: {\"a\":1} done"), "{\"a\":1}");
        assert_eq!(extract_json("  plain  "), "plain");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }
}
