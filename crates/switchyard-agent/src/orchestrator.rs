use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::Result;
use switchyard_core::event::EventBus;
use switchyard_core::traits::{LlmClient, ToolExecutor};
use switchyard_core::transcript::Transcript;
use switchyard_core::types::{ApprovalRequest, FinalOutput, RunId, WorkflowEvent};
use switchyard_guard::GuardrailPipeline;
use switchyard_tools::ToolRegistry;

use crate::approval::{gate_from_config, ApprovalDecision, ApprovalGate};
use crate::context::RunContext;
use crate::node::{AgentNode, NodeResult};
use crate::outcome::{RunOutcome, RunRecord};
use crate::runner::NodeRunner;
use crate::workflow::{Continuation, Workflow};

/// Drives one workflow run from raw input to a terminal outcome.
///
/// Guardrails first, then the classifier, the routed branch's nodes in order,
/// and finally the branch's approval checkpoint. Nodes never run concurrently.
pub struct Orchestrator {
    runner: NodeRunner,
    guardrails: Arc<GuardrailPipeline>,
    approval: Arc<dyn ApprovalGate>,
    event_bus: Arc<EventBus>,
}

/// Shared infrastructure for building an orchestrator.
///
/// Guardrails and the approval gate default to what `config` describes;
/// tools default to an empty registry.
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    tools: Option<Arc<dyn ToolExecutor>>,
    event_bus: Option<Arc<EventBus>>,
    guardrails: Option<GuardrailPipeline>,
    approval: Option<Arc<dyn ApprovalGate>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            llm,
            tools: None,
            event_bus: None,
            guardrails: None,
            approval: None,
        }
    }

    pub fn tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn guardrails(mut self, pipeline: GuardrailPipeline) -> Self {
        self.guardrails = Some(pipeline);
        self
    }

    pub fn approval(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let guardrails = match self.guardrails {
            Some(pipeline) => pipeline,
            None => GuardrailPipeline::from_config(&self.config, self.llm.clone())?,
        };
        let approval = match self.approval {
            Some(gate) => gate,
            None => gate_from_config(&self.config.approval)?,
        };
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()) as Arc<dyn ToolExecutor>);
        let event_bus = self.event_bus.unwrap_or_default();

        let runner = NodeRunner::new(Arc::new(self.config), self.llm, tools, event_bus.clone());
        Ok(Orchestrator::new(
            runner,
            Arc::new(guardrails),
            approval,
            event_bus,
        ))
    }
}

/// State owned by a single run.
struct RunState {
    run_id: RunId,
    transcript: Transcript,
    ctx: RunContext,
    classification: Option<String>,
    branch: Option<String>,
    checkpoints: Vec<usize>,
}

impl Orchestrator {
    pub fn new(
        runner: NodeRunner,
        guardrails: Arc<GuardrailPipeline>,
        approval: Arc<dyn ApprovalGate>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            runner,
            guardrails,
            approval,
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run `workflow` on `input`. Never fails; every error becomes an outcome.
    pub async fn run_workflow(&self, workflow: &Workflow, input: &str) -> RunOutcome {
        self.run_detailed(workflow, input, RunId::new()).await.outcome
    }

    /// Like `run_workflow`, also returning the transcript and routing decisions.
    pub async fn run_detailed(&self, workflow: &Workflow, input: &str, run_id: RunId) -> RunRecord {
        let start = Instant::now();
        self.event_bus.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow: workflow.name.clone(),
            metadata: workflow.trace_metadata(),
        });
        info!(run_id = %run_id, workflow = %workflow.name, "Run started");

        let mut state = RunState {
            run_id: run_id.clone(),
            transcript: Transcript::new(),
            ctx: RunContext::new(),
            classification: None,
            branch: None,
            checkpoints: Vec::new(),
        };

        let outcome = match self.drive(workflow, input, &mut state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id = %run_id, kind = ?e.kind(), error = %e, "Run failed");
                RunOutcome::fatal(&e)
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.event_bus.publish(WorkflowEvent::RunFinished {
            run_id: run_id.clone(),
            status: outcome.status().to_string(),
            elapsed_ms,
        });
        info!(run_id = %run_id, status = outcome.status(), elapsed_ms, "Run finished");

        RunRecord {
            run_id,
            outcome,
            transcript: state.transcript,
            classification: state.classification,
            branch: state.branch,
            checkpoints: state.checkpoints,
        }
    }

    async fn drive(&self, wf: &Workflow, input: &str, state: &mut RunState) -> Result<RunOutcome> {
        wf.validate()?;

        // GuardrailCheck
        let safe_input = if wf.guardrails.is_empty() {
            input.to_string()
        } else {
            let outcome = self.guardrails.evaluate(input, &wf.guardrails).await;
            self.event_bus.publish(WorkflowEvent::GuardrailsEvaluated {
                run_id: state.run_id.clone(),
                tripwire_triggered: outcome.tripwire_triggered,
                checks: outcome.checks,
            });
            if let Some(report) = outcome.report {
                return Ok(RunOutcome::guardrail(report));
            }
            outcome.safe_text
        };

        state.ctx = wf.context.build(&safe_input);
        state.transcript = Transcript::seeded(safe_input);

        // Classify
        if let Some(classifier) = &wf.classifier {
            let tolerate = self.runner.config().run.tolerate_tool_errors;
            let result = match self.invoke(wf, &classifier.node, state, tolerate).await? {
                Invocation::Done(result) => result,
                Invocation::Tripped(outcome) => return Ok(outcome),
            };
            state.classification = result
                .final_output
                .field(&classifier.field)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if state.classification.is_none() {
                warn!(node = %classifier.node.name, field = %classifier.field, "Classifier gave no usable classification");
            }
        }

        // Route
        let branch_id = wf.router.route(state.classification.as_deref()).to_string();
        self.event_bus.publish(WorkflowEvent::RouteSelected {
            run_id: state.run_id.clone(),
            classification: state.classification.clone(),
            branch: branch_id.clone(),
        });
        info!(classification = ?state.classification, branch = %branch_id, "Route selected");
        let branch = wf.branch(&branch_id)?;
        state.branch = Some(branch_id);
        let tolerate = branch.tolerate_tool_errors || self.runner.config().run.tolerate_tool_errors;

        // AgentExecuting
        let mut current: Option<FinalOutput> = None;
        for node in &branch.nodes {
            match self.invoke(wf, node, state, tolerate).await? {
                Invocation::Done(result) => current = Some(result.final_output),
                Invocation::Tripped(outcome) => return Ok(outcome),
            }
        }
        let Some(mut current) = current else {
            // validate() rejects empty branches
            return Err(switchyard_core::SwitchyardError::InvalidWorkflow {
                workflow: wf.name.clone(),
                message: format!("branch '{}' produced no output", branch.id),
            });
        };

        if let Some(transform) = &branch.transform {
            current = transform(&current);
        }

        let Some(checkpoint) = &branch.approval else {
            return Ok(RunOutcome::completed(current));
        };

        // ApprovalPending
        let message = (checkpoint.message)(&current);
        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: state.run_id.to_string(),
            workflow: wf.name.clone(),
            message: message.clone(),
            timestamp: Utc::now(),
        };
        self.event_bus.publish(WorkflowEvent::ApprovalRequested {
            request: request.clone(),
        });
        let decision = self.approval.request_approval(&request).await?;
        self.event_bus.publish(WorkflowEvent::ApprovalResolved {
            request_id: request.id.clone(),
            decision: decision.as_str().to_string(),
        });
        info!(decision = decision.as_str(), "Approval resolved");

        let continuation = match decision {
            ApprovalDecision::Approved => &checkpoint.on_approve,
            ApprovalDecision::Denied => &checkpoint.on_deny,
            ApprovalDecision::Deferred => {
                return Ok(RunOutcome::Pending {
                    approval_message: message,
                })
            }
        };

        match continuation {
            Continuation::ReturnCurrent => Ok(RunOutcome::completed(current)),
            Continuation::Reply(text) => Ok(RunOutcome::completed(FinalOutput::Text(text.clone()))),
            Continuation::RunNode(node) => {
                match self.invoke(wf, node, state, tolerate).await? {
                    Invocation::Done(result) => Ok(RunOutcome::completed(result.final_output)),
                    Invocation::Tripped(outcome) => Ok(outcome),
                }
            }
        }
    }

    /// Run one node, fold its output into the context, and optionally guard it.
    async fn invoke(
        &self,
        wf: &Workflow,
        node: &AgentNode,
        state: &mut RunState,
        tolerate_tool_errors: bool,
    ) -> Result<Invocation> {
        let result = self
            .runner
            .run(
                &state.run_id,
                node,
                &mut state.transcript,
                &state.ctx,
                tolerate_tool_errors,
            )
            .await?;
        state.checkpoints.push(state.transcript.len());
        state.ctx.ingest_output(&node.output_keys, &result.final_output);

        if self.runner.config().run.guard_agent_output && !wf.guardrails.is_empty() {
            let text = result.final_output.to_text();
            let outcome = self.guardrails.evaluate(&text, &wf.guardrails).await;
            self.event_bus.publish(WorkflowEvent::GuardrailsEvaluated {
                run_id: state.run_id.clone(),
                tripwire_triggered: outcome.tripwire_triggered,
                checks: outcome.checks,
            });
            if let Some(report) = outcome.report {
                warn!(node = %node.name, "Guardrail tripped on node output");
                return Ok(Invocation::Tripped(RunOutcome::guardrail(report)));
            }
        }

        debug!(node = %node.name, transcript_len = state.transcript.len(), "Node folded into run");
        Ok(Invocation::Done(result))
    }
}

enum Invocation {
    Done(NodeResult),
    Tripped(RunOutcome),
}
