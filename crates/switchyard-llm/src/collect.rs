use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::warn;

use switchyard_core::error::Result;
use switchyard_core::types::{ContentBlock, StopReason, StreamDelta};

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// A fully drained model response.
#[derive(Debug, Default, Clone)]
pub struct Completion {
    pub text: String,
    /// Tool calls as `ContentBlock::ToolCall`, in stream index order.
    pub tool_calls: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Tool calls whose arguments did not parse as JSON.
    pub invalid_inputs: Vec<InvalidToolInput>,
}

/// A tool call whose raw arguments are kept as a string input.
#[derive(Debug, Clone)]
pub struct InvalidToolInput {
    pub call_id: String,
    pub error: String,
}

impl Completion {
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The model stopped on the token limit or a content filter.
    pub fn is_truncated(&self) -> bool {
        self.stop_reason.as_ref().is_some_and(StopReason::is_truncated)
    }

    /// Parse error for a tool call's arguments, if they were not valid JSON.
    pub fn input_error(&self, call_id: &str) -> Option<&str> {
        self.invalid_inputs
            .iter()
            .find(|i| i.call_id == call_id)
            .map(|i| i.error.as_str())
    }
}

/// Drain a delta stream, calling `on_text` for every text chunk.
///
/// Stream errors abort the drain. Tool arguments that are not valid JSON are
/// recorded in `invalid_inputs` and carried as a raw string.
pub async fn collect_completion(
    mut stream: BoxStream<'_, Result<StreamDelta>>,
    mut on_text: impl FnMut(&str),
) -> Result<Completion> {
    let mut completion = Completion::default();
    let mut calls: Vec<ToolCallAccumulator> = Vec::new();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(text) => {
                on_text(&text);
                completion.text.push_str(&text);
            }
            StreamDelta::ToolUseStart { index, id, name } => {
                while calls.len() <= index {
                    calls.push(ToolCallAccumulator::default());
                }
                calls[index].id = id;
                calls[index].name = name;
            }
            StreamDelta::ToolInputDelta { index, delta } => {
                if let Some(tc) = calls.get_mut(index) {
                    tc.input_json.push_str(&delta);
                }
            }
            StreamDelta::Stop(reason) => completion.stop_reason = Some(reason),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                completion.input_tokens += input_tokens;
                completion.output_tokens += output_tokens;
            }
        }
    }

    let mut invalid_inputs = Vec::new();
    completion.tool_calls = calls
        .into_iter()
        .filter(|tc| !tc.name.is_empty())
        .enumerate()
        .map(|(i, tc)| {
            let id = if tc.id.is_empty() {
                format!("call_{}", i)
            } else {
                tc.id
            };
            let input = if tc.input_json.trim().is_empty() {
                serde_json::json!({})
            } else {
                match serde_json::from_str(&tc.input_json) {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool arguments are not valid JSON");
                        invalid_inputs.push(InvalidToolInput {
                            call_id: id.clone(),
                            error: e.to_string(),
                        });
                        serde_json::Value::String(tc.input_json)
                    }
                }
            };
            ContentBlock::ToolCall {
                id,
                name: tc.name,
                input,
            }
        })
        .collect();
    completion.invalid_inputs = invalid_inputs;

    Ok(completion)
}
