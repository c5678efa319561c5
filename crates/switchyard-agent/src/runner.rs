use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::EventBus;
use switchyard_core::traits::{LlmClient, ToolExecutor};
use switchyard_core::transcript::Transcript;
use switchyard_core::types::*;
use switchyard_llm::{collect_completion, Completion};

use crate::context::RunContext;
use crate::node::{AgentNode, NodeResult};

/// Executes one node invocation against the shared transcript.
///
/// Each invocation is a bounded tool loop: ask the model, run any requested
/// tools in order, feed the results back, and stop at the first turn without
/// tool calls.
pub struct NodeRunner {
    config: Arc<AppConfig>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolExecutor>,
    event_bus: Arc<EventBus>,
}

impl NodeRunner {
    pub fn new(
        config: Arc<AppConfig>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolExecutor>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            llm,
            tools,
            event_bus,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run `node` over the whole transcript, appending everything it produces.
    ///
    /// Contract violations, tool failures (unless tolerated) and model
    /// timeouts are returned as errors; the turns appended before the error
    /// stay in the transcript.
    pub async fn run(
        &self,
        run_id: &RunId,
        node: &AgentNode,
        transcript: &mut Transcript,
        ctx: &RunContext,
        tolerate_tool_errors: bool,
    ) -> Result<NodeResult> {
        let start = Instant::now();
        let mark = transcript.len();
        let model = node.model.resolve(&self.config);
        let max_turns = node.max_turns.unwrap_or(self.config.run.max_turns);
        let instructions = node.instructions.resolve(ctx);
        let tool_defs = self.tools.definitions_for(&node.tools);
        let schema = node.output.as_ref().map(|c| c.to_json_schema());

        self.event_bus.publish(WorkflowEvent::NodeStarted {
            run_id: run_id.clone(),
            node: node.name.clone(),
        });
        info!(node = %node.name, model = %model.model_id, tools = tool_defs.len(), "Running node");

        let mut input_tokens = 0;
        let mut output_tokens = 0;

        for turn in 0..max_turns {
            let mut request = ChatRequest::new(transcript.snapshot())
                .with_instructions(instructions.clone())
                .with_tools(tool_defs.clone());
            if let Some(schema) = &schema {
                request = request.with_response_schema(schema.clone());
            }

            let completion = self.complete(&node.name, &model, request).await?;
            input_tokens += completion.input_tokens;
            output_tokens += completion.output_tokens;

            if completion.is_truncated() {
                let reason = completion
                    .stop_reason
                    .as_ref()
                    .map_or("unknown", StopReason::as_str);
                warn!(node = %node.name, stop_reason = reason, "Model output was cut off");
                return Err(match &node.output {
                    Some(_) => SwitchyardError::SchemaValidation {
                        node: node.name.clone(),
                        issues: vec![format!("Output was cut off ({})", reason)],
                    },
                    None => SwitchyardError::MissingOutput {
                        node: node.name.clone(),
                    },
                });
            }

            if completion.wants_tools() {
                debug!(node = %node.name, turn, calls = completion.tool_calls.len(), "Model requested tools");
                let mut content = Vec::new();
                if !completion.text.is_empty() {
                    content.push(ContentBlock::Text {
                        text: completion.text.clone(),
                    });
                }
                content.extend(completion.tool_calls.iter().cloned());
                transcript.push(Turn::new(Origin::node(&node.name), content));

                let results = self
                    .run_tools(run_id, node, &completion, tolerate_tool_errors)
                    .await?;
                transcript.push(Turn::new(Origin::node(&node.name), results));
                continue;
            }

            if completion.text.trim().is_empty() {
                return Err(SwitchyardError::MissingOutput {
                    node: node.name.clone(),
                });
            }
            let final_output = match &node.output {
                Some(contract) => {
                    let value = contract.parse(&node.name, &completion.text)?;
                    transcript.push(Turn::node_structured(&node.name, value.clone()));
                    FinalOutput::Structured(value)
                }
                None => {
                    transcript.push(Turn::node_text(&node.name, completion.text.clone()));
                    FinalOutput::Text(completion.text)
                }
            };

            let new_turns = transcript.since(mark).to_vec();
            let elapsed_ms = start.elapsed().as_millis() as u64;
            self.event_bus.publish(WorkflowEvent::NodeCompleted {
                run_id: run_id.clone(),
                node: node.name.clone(),
                new_turns: new_turns.len(),
                input_tokens,
                output_tokens,
                elapsed_ms,
            });
            info!(node = %node.name, new_turns = new_turns.len(), elapsed_ms, "Node completed");

            return Ok(NodeResult {
                new_turns,
                final_output,
                input_tokens,
                output_tokens,
            });
        }

        Err(SwitchyardError::MaxTurnsExceeded {
            node: node.name.clone(),
            max_turns,
        })
    }

    /// One model call, streamed to the event bus and bounded by the model timeout.
    async fn complete(
        &self,
        node: &str,
        model: &switchyard_core::config::ModelConfig,
        request: ChatRequest,
    ) -> Result<Completion> {
        let secs = self.config.run.model_timeout_secs;
        let call = async {
            let stream = self.llm.chat_stream(model, request).await?;
            collect_completion(stream, |text| {
                self.event_bus.publish(WorkflowEvent::TextDelta {
                    node: node.to_string(),
                    text: text.to_string(),
                });
            })
            .await
        };

        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(node = %node, timeout_secs = secs, "Model call timed out");
                Err(SwitchyardError::Timeout {
                    operation: format!("model call for node '{}'", node),
                    secs,
                })
            }
        }
    }

    /// Execute tool calls in order and return their result blocks.
    ///
    /// Calls with arguments that are not valid JSON fail without reaching
    /// the executor.
    async fn run_tools(
        &self,
        run_id: &RunId,
        node: &AgentNode,
        completion: &Completion,
        tolerate_errors: bool,
    ) -> Result<Vec<ContentBlock>> {
        let mut blocks = Vec::with_capacity(completion.tool_calls.len());

        for call in &completion.tool_calls {
            let ContentBlock::ToolCall { id, name, input } = call else {
                continue;
            };

            self.event_bus.publish(WorkflowEvent::ToolStart {
                node: node.name.clone(),
                name: name.clone(),
                input: input.clone(),
            });

            let ctx = ToolContext {
                run_id: run_id.clone(),
                node: node.name.clone(),
            };
            let result = if !node.tools.iter().any(|t| t == name) {
                Err(SwitchyardError::ToolNotFound(name.clone()))
            } else if let Some(error) = completion.input_error(id) {
                Err(SwitchyardError::ToolExecution {
                    tool: name.clone(),
                    message: format!("invalid arguments: {}", error),
                })
            } else {
                self.tools.execute(name, input.clone(), ctx).await
            };

            let result = match result {
                Ok(result) => result,
                Err(e) if tolerate_errors => {
                    warn!(node = %node.name, tool = %name, error = %e, "Tool failed, returning error to model");
                    ToolResult::error(e.to_string())
                }
                Err(e) => {
                    warn!(node = %node.name, tool = %name, error = %e, "Tool failed");
                    return Err(e);
                }
            };

            self.event_bus.publish(WorkflowEvent::ToolEnd {
                node: node.name.clone(),
                name: name.clone(),
                result: result.clone(),
            });

            blocks.push(ContentBlock::ToolResult {
                call_id: id.clone(),
                content: result.content,
                is_error: result.is_error,
            });
        }

        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldKind, OutputContract};
    use futures::future::BoxFuture;
    use futures::stream::BoxStream;
    use switchyard_core::config::ModelConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_tools::{FnTool, ToolRegistry};

    /// Asks for `lookup` once, then answers with the given text.
    struct LookupThenAnswer {
        args: &'static str,
        answer: &'static str,
        stop: StopReason,
    }

    impl LookupThenAnswer {
        fn new(answer: &'static str) -> Self {
            Self {
                args: r#"{"q":"plan"}"#,
                answer,
                stop: StopReason::EndTurn,
            }
        }
    }

    impl LlmClient for LookupThenAnswer {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            request: ChatRequest,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            let saw_result = request.turns.iter().any(|t| t.has_tool_results());
            let deltas = if saw_result {
                vec![
                    Ok(StreamDelta::TextDelta(self.answer.to_string())),
                    Ok(StreamDelta::Stop(self.stop.clone())),
                ]
            } else {
                vec![
                    Ok(StreamDelta::ToolUseStart {
                        index: 0,
                        id: "call_a".into(),
                        name: "lookup".into(),
                    }),
                    Ok(StreamDelta::ToolInputDelta {
                        index: 0,
                        delta: self.args.to_string(),
                    }),
                    Ok(StreamDelta::Stop(StopReason::ToolUse)),
                ]
            };
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    fn runner_with(llm: LookupThenAnswer, lookups: Arc<AtomicUsize>) -> NodeRunner {
        let mut tools = ToolRegistry::new();
        tools.register(FnTool::sync(
            "lookup",
            "Look something up.",
            serde_json::json!({"type": "object"}),
            move |input| {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(format!("found {}", input["q"].as_str().unwrap_or("?")))
            },
        ));
        NodeRunner::new(
            Arc::new(AppConfig::with_model(ModelConfig::new("test-model"))),
            Arc::new(llm),
            Arc::new(tools),
            Arc::new(EventBus::default()),
        )
    }

    fn runner(answer: &'static str) -> NodeRunner {
        runner_with(LookupThenAnswer::new(answer), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test]
    async fn test_tool_loop_appends_turns_in_order() {
        let runner = runner("You are on the premium plan.");
        let node = AgentNode::new("Helper", "Help.").with_tools(&["lookup"]);
        let mut transcript = Transcript::seeded("what plan am I on?");

        let result = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap();

        assert_eq!(result.new_turns.len(), 3);
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.turns()[1].tool_calls()[0].1, "lookup");
        match &transcript.turns()[2].content[0] {
            ContentBlock::ToolResult {
                call_id, content, ..
            } => {
                assert_eq!(call_id, "call_a");
                assert_eq!(content, "found plan");
            }
            other => panic!("unexpected block {:?}", other),
        }
        assert_eq!(
            result.final_output,
            FinalOutput::Text("You are on the premium plan.".into())
        );
    }

    #[tokio::test]
    async fn test_structured_output_replaces_raw_text() {
        let runner = runner("```json\n{\"plan\": \"premium\"}\n```");
        let node = AgentNode::new("Helper", "Help.")
            .with_tools(&["lookup"])
            .with_output(OutputContract::new("Plan").field("plan", FieldKind::String));
        let mut transcript = Transcript::seeded("plan?");

        let result = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap();

        let last = transcript.last().unwrap();
        assert_eq!(last.structured(), Some(&serde_json::json!({"plan": "premium"})));
        assert!(last.text().is_empty());
        assert_eq!(result.final_output.field("plan"), Some(&serde_json::json!("premium")));
    }

    #[tokio::test]
    async fn test_max_turns_exceeded() {
        let runner = runner("never");
        let node = AgentNode::new("Helper", "Help.")
            .with_tools(&["lookup"])
            .with_max_turns(1);
        let mut transcript = Transcript::seeded("plan?");

        let err = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::MaxTurnsExceeded { max_turns: 1, .. }));
    }

    #[tokio::test]
    async fn test_cut_off_structured_output_is_rejected() {
        let llm = LookupThenAnswer {
            stop: StopReason::MaxTokens,
            ..LookupThenAnswer::new(r#"{"plan": "premium"}"#)
        };
        let runner = runner_with(llm, Arc::new(AtomicUsize::new(0)));
        let node = AgentNode::new("Helper", "Help.")
            .with_tools(&["lookup"])
            .with_output(OutputContract::new("Plan").field("plan", FieldKind::String));
        let mut transcript = Transcript::seeded("plan?");

        let err = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::SchemaValidation { .. }));
        assert!(err.to_string().contains("max_tokens"));
        assert!(transcript.last().unwrap().structured().is_none());
    }

    #[tokio::test]
    async fn test_filtered_text_output_is_missing() {
        let llm = LookupThenAnswer {
            stop: StopReason::ContentFilter,
            ..LookupThenAnswer::new("You are on the prem")
        };
        let runner = runner_with(llm, Arc::new(AtomicUsize::new(0)));
        let node = AgentNode::new("Helper", "Help.").with_tools(&["lookup"]);
        let mut transcript = Transcript::seeded("plan?");

        let err = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_malformed_tool_arguments_never_reach_the_tool() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let malformed = || LookupThenAnswer {
            args: r#"{"customer_status": "#,
            ..LookupThenAnswer::new("done")
        };
        let node = AgentNode::new("Helper", "Help.").with_tools(&["lookup"]);

        let runner = runner_with(malformed(), lookups.clone());
        let mut transcript = Transcript::seeded("plan?");
        let err = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::ToolExecution { ref tool, .. } if tool == "lookup"));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);

        // Tolerated: the parse error goes back to the model as the tool result.
        let runner = runner_with(malformed(), lookups.clone());
        let mut transcript = Transcript::seeded("plan?");
        let result = runner
            .run(&RunId::new(), &node, &mut transcript, &RunContext::new(), true)
            .await
            .unwrap();
        assert_eq!(result.final_output, FinalOutput::Text("done".into()));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
        match &transcript.turns()[2].content[0] {
            ContentBlock::ToolResult {
                is_error, content, ..
            } => {
                assert!(*is_error);
                assert!(content.contains("invalid arguments"));
            }
            other => panic!("unexpected block {:?}", other),
        }
    }
}
