use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::{ChatRequest, StopReason, StreamDelta};

/// One canned model response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Plain text, streamed in two chunks.
    Text(String),
    /// Tool calls as `(name, input)` pairs; ids are `call_<n>`.
    ToolCalls(Vec<(String, serde_json::Value)>),
    /// Text cut off by the token limit.
    Truncated(String),
    /// The stream fails with an upstream error.
    Fail(String),
    /// The response arrives only after the delay.
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Structured output rendered as JSON text.
    pub fn json(value: serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }

    pub fn truncated(text: impl Into<String>) -> Self {
        Self::Truncated(text.into())
    }

    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolCalls(vec![(name.into(), input)])
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// What a node sent to the model.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub request: ChatRequest,
}

/// LLM client that replays a queue of replies in call order.
///
/// Every request is recorded. Calls past the end of the script fail.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn deltas(reply: ScriptedReply) -> Vec<Result<StreamDelta>> {
        match reply {
            ScriptedReply::Text(text) => {
                let mid = (0..=text.len() / 2)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                let (head, tail) = text.split_at(mid);
                vec![
                    Ok(StreamDelta::TextDelta(head.to_string())),
                    Ok(StreamDelta::TextDelta(tail.to_string())),
                    Ok(StreamDelta::Usage {
                        input_tokens: 10,
                        output_tokens: 5,
                    }),
                    Ok(StreamDelta::Stop(StopReason::EndTurn)),
                ]
            }
            ScriptedReply::ToolCalls(calls) => {
                let mut deltas = Vec::new();
                for (index, (name, input)) in calls.into_iter().enumerate() {
                    deltas.push(Ok(StreamDelta::ToolUseStart {
                        index,
                        id: format!("call_{}", index),
                        name,
                    }));
                    deltas.push(Ok(StreamDelta::ToolInputDelta {
                        index,
                        delta: input.to_string(),
                    }));
                }
                deltas.push(Ok(StreamDelta::Stop(StopReason::ToolUse)));
                deltas
            }
            ScriptedReply::Truncated(text) => vec![
                Ok(StreamDelta::TextDelta(text)),
                Ok(StreamDelta::Stop(StopReason::MaxTokens)),
            ],
            ScriptedReply::Fail(message) => vec![Err(SwitchyardError::Upstream {
                service: "scripted-llm".into(),
                message,
            })],
            ScriptedReply::Delayed(_, inner) => Self::deltas(*inner),
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.lock().unwrap().push(RecordedCall {
            model_id: config.model_id.clone(),
            request,
        });
        let reply = self.replies.lock().unwrap().pop_front();

        Box::pin(async move {
            let mut reply = reply.ok_or_else(|| {
                SwitchyardError::LlmRequest("scripted LLM has no reply left".into())
            })?;
            while let ScriptedReply::Delayed(delay, inner) = reply {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            let stream: BoxStream<'_, Result<StreamDelta>> =
                Box::pin(stream::iter(Self::deltas(reply)));
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use switchyard_core::types::Turn;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let llm = ScriptedLlm::new(vec![
            ScriptedReply::text("héllo"),
            ScriptedReply::tool_call("lookup", serde_json::json!({"q": 1})),
        ]);
        let config = ModelConfig::new("test-model");

        let mut first = llm
            .chat_stream(&config, ChatRequest::new(vec![Turn::user("hi")]))
            .await
            .unwrap();
        let mut text = String::new();
        while let Some(delta) = first.next().await {
            if let StreamDelta::TextDelta(t) = delta.unwrap() {
                text.push_str(&t);
            }
        }
        assert_eq!(text, "héllo");

        let second: Vec<_> = llm
            .chat_stream(&config, ChatRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(
            second.last(),
            Some(Ok(StreamDelta::Stop(StopReason::ToolUse)))
        ));

        assert!(llm.chat_stream(&config, ChatRequest::default()).await.is_err());
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[0].model_id, "test-model");
    }
}
