use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OaiMessage {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiToolCall {
    #[serde(default)]
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<OaiFunction>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct OaiFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Map a transcript onto chat messages.
///
/// User turns become `user` messages. Node turns become `assistant` messages,
/// with structured output rendered as JSON text and tool results split out
/// into `tool` messages.
pub(crate) fn convert_turns(instructions: Option<&str>, turns: &[Turn]) -> Vec<OaiMessage> {
    let mut msgs = Vec::new();

    if let Some(instructions) = instructions.filter(|i| !i.is_empty()) {
        msgs.push(OaiMessage::plain("system", instructions.to_string()));
    }

    for turn in turns {
        if turn.origin.is_user() {
            msgs.push(OaiMessage::plain("user", turn.text()));
            continue;
        }

        if turn.has_tool_results() {
            for block in &turn.content {
                if let ContentBlock::ToolResult {
                    call_id, content, ..
                } = block
                {
                    msgs.push(OaiMessage {
                        role: "tool".to_string(),
                        content: Some(content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(call_id.clone()),
                    });
                }
            }
            continue;
        }

        let mut text = turn.text();
        if let Some(value) = turn.structured() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&value.to_string());
        }

        let calls: Vec<OaiToolCall> = turn
            .tool_calls()
            .into_iter()
            .enumerate()
            .map(|(i, (id, name, input))| OaiToolCall {
                index: i,
                id: Some(id.to_string()),
                r#type: Some("function".to_string()),
                function: Some(OaiFunction {
                    name: Some(name.to_string()),
                    arguments: Some(input.to_string()),
                }),
            })
            .collect();

        msgs.push(OaiMessage {
            role: "assistant".to_string(),
            content: if text.is_empty() && !calls.is_empty() {
                None
            } else {
                Some(text)
            },
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
            tool_call_id: None,
        });
    }

    msgs
}

fn response_format(schema: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "node_output",
            "strict": false,
            "schema": schema,
        }
    })
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };

    if let Some(delta) = choice.delta {
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            deltas.push(Ok(StreamDelta::TextDelta(text)));
        }

        // Some providers send name and arguments in the same chunk.
        for tc in delta.tool_calls.unwrap_or_default() {
            if let Some(func) = tc.function {
                if let Some(name) = func.name {
                    deltas.push(Ok(StreamDelta::ToolUseStart {
                        index: tc.index,
                        id: tc.id.unwrap_or_default(),
                        name,
                    }));
                }
                if let Some(args) = func.arguments.filter(|a| !a.is_empty()) {
                    deltas.push(Ok(StreamDelta::ToolInputDelta {
                        index: tc.index,
                        delta: args,
                    }));
                }
            }
        }
    }

    if let Some(reason) = choice.finish_reason {
        let stop = match reason.as_str() {
            "tool_calls" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };
        deltas.push(Ok(StreamDelta::Stop(stop)));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let reasoning = config.reasoning != ReasoningEffort::Off;

            let body = OaiRequest {
                model: config.model_id.clone(),
                messages: convert_turns(request.instructions.as_deref(), &request.turns),
                max_completion_tokens: config.max_tokens,
                // Reasoning models reject sampling parameters
                temperature: if reasoning { None } else { config.temperature },
                top_p: if reasoning { None } else { config.top_p },
                stream: true,
                stream_options: StreamOptions {
                    include_usage: true,
                },
                tools: convert_tools(&request.tools),
                response_format: request.response_schema.as_ref().map(response_format),
                reasoning_effort: reasoning.then(|| config.reasoning.as_str().to_string()),
            };

            debug!(
                model = %body.model,
                messages = body.messages.len(),
                tools = body.tools.len(),
                "Sending chat request"
            );

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }
            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| SwitchyardError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(SwitchyardError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let delta_stream = SseStream::new(response.bytes_stream())
                .map(|event| match event {
                    Ok(event) => futures::stream::iter(parse_chunk(event)),
                    Err(e) => futures::stream::iter(vec![Err(e)]),
                })
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_convert_turns_roles() {
        let turns = vec![
            Turn::user("Where is my order?"),
            Turn::node_structured(
                "Query Classifier",
                serde_json::json!({"classification": "get_information"}),
            ),
            Turn::node_text("FAQ Agent", "It ships tomorrow."),
        ];
        let msgs = convert_turns(Some("Be helpful."), &turns);
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "assistant"]);
        assert_eq!(
            msgs[2].content.as_deref(),
            Some(r#"{"classification":"get_information"}"#)
        );
    }

    #[test]
    fn test_convert_turns_tool_round_trip() {
        let call = Turn::new(
            Origin::node("Retention Agent"),
            vec![ContentBlock::ToolCall {
                id: "call_1".into(),
                name: "propose_retention_option".into(),
                input: serde_json::json!({"customer_status": "active"}),
            }],
        );
        let result = Turn::new(
            Origin::node("Retention Agent"),
            vec![ContentBlock::ToolResult {
                call_id: "call_1".into(),
                content: "offer sent".into(),
                is_error: false,
            }],
        );
        let msgs = convert_turns(None, &[Turn::user("cancel"), call, result]);
        assert_eq!(msgs.len(), 3);
        assert!(msgs[1].content.is_none());
        assert_eq!(msgs[1].tool_calls.as_ref().map(|c| c.len()), Some(1));
        assert_eq!(msgs[2].role, "tool");
        assert_eq!(msgs[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_parse_chunk_text_and_finish() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":"stop"}]}"#,
        ));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hi"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::Stop(StopReason::EndTurn))));
    }

    #[test]
    fn test_parse_chunk_truncating_finish_reasons() {
        let length = parse_chunk(event(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#));
        assert!(matches!(length.last(), Some(Ok(StreamDelta::Stop(StopReason::MaxTokens)))));

        let filtered = parse_chunk(event(
            r#"{"choices":[{"delta":{},"finish_reason":"content_filter"}]}"#,
        ));
        assert!(matches!(
            filtered.last(),
            Some(Ok(StreamDelta::Stop(StopReason::ContentFilter)))
        ));
    }

    #[test]
    fn test_parse_chunk_tool_call_in_one_chunk() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"lookup","arguments":"{\"q\":1}"}}]}}]}"#,
        ));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, .. }) if name == "lookup"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { delta, .. }) if delta == "{\"q\":1}"));
    }

    #[test]
    fn test_parse_chunk_usage_and_done() {
        let deltas = parse_chunk(event(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
        ));
        assert!(matches!(
            &deltas[0],
            Ok(StreamDelta::Usage { input_tokens: 12, output_tokens: 3 })
        ));
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("not json")).is_empty());
    }

    #[test]
    fn test_response_format_wraps_schema() {
        let format = response_format(&serde_json::json!({"type": "object"}));
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["schema"]["type"], "object");
    }
}
