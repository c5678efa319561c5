use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use switchyard_core::types::{RunId, WorkflowEvent};

/// JSONL run logger.
///
/// Reads an EventBus subscription and appends one JSON object per line to
/// `{log_dir}/{run_id}.jsonl`. Lines already written survive a crash.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1=run summary, 2=per-node, 3=per-tool.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn log_path(&self, run_id: &RunId) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", run_id))
    }

    /// Write entries for `run_id` until cancelled or the run finishes.
    ///
    /// Subscribe before the run starts; events published earlier are missed.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<WorkflowEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let log_path = self.log_path(&run_id);
        let file = match open_append(&log_path).await {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            // Buffered events are drained before cancellation is honoured.
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if !concerns(&event, &run_id) {
                                continue;
                            }
                            let Some(entry) = self.event_to_entry(&run_id, &event) else {
                                continue;
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if matches!(event, WorkflowEvent::RunFinished { .. }) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry; `None` when filtered by level.
    fn event_to_entry(&self, run_id: &RunId, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, node: Option<&str>, detail: Option<serde_json::Value>| {
            LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                run_id: run_id.to_string(),
                event_type: event_type.to_string(),
                node: node.map(str::to_string),
                detail,
            }
        };

        match event {
            // L1
            WorkflowEvent::RunStarted {
                workflow, metadata, ..
            } => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({ "workflow": workflow, "metadata": metadata })),
            )),
            WorkflowEvent::GuardrailsEvaluated {
                tripwire_triggered,
                checks,
                ..
            } => Some(entry(
                "guardrails_evaluated",
                None,
                Some(serde_json::json!({
                    "tripwire_triggered": tripwire_triggered,
                    "checks": checks,
                })),
            )),
            WorkflowEvent::RouteSelected {
                classification,
                branch,
                ..
            } => Some(entry(
                "route_selected",
                None,
                Some(serde_json::json!({ "classification": classification, "branch": branch })),
            )),
            WorkflowEvent::ApprovalRequested { request } => Some(entry(
                "approval_requested",
                None,
                Some(serde_json::json!({
                    "request_id": request.id,
                    "message": truncate_str(&request.message, 200),
                })),
            )),
            WorkflowEvent::ApprovalResolved {
                request_id,
                decision,
            } => Some(entry(
                "approval_resolved",
                None,
                Some(serde_json::json!({ "request_id": request_id, "decision": decision })),
            )),
            WorkflowEvent::RunFinished {
                status, elapsed_ms, ..
            } => Some(entry(
                "run_finished",
                None,
                Some(serde_json::json!({ "status": status, "elapsed_ms": elapsed_ms })),
            )),

            // L2
            WorkflowEvent::NodeStarted { node, .. } if self.level >= 2 => {
                Some(entry("node_started", Some(node), None))
            }
            WorkflowEvent::NodeCompleted {
                node,
                new_turns,
                input_tokens,
                output_tokens,
                elapsed_ms,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(node),
                Some(serde_json::json!({
                    "new_turns": new_turns,
                    "input_tokens": input_tokens,
                    "output_tokens": output_tokens,
                    "elapsed_ms": elapsed_ms,
                })),
            )),

            // L3
            WorkflowEvent::ToolStart { node, name, input } if self.level >= 3 => Some(entry(
                "tool_start",
                Some(node),
                Some(serde_json::json!({
                    "tool": name,
                    "input": truncate_str(&input.to_string(), 500),
                })),
            )),
            WorkflowEvent::ToolEnd { node, name, result } if self.level >= 3 => Some(entry(
                "tool_end",
                Some(node),
                Some(serde_json::json!({
                    "tool": name,
                    "is_error": result.is_error,
                    "content_preview": truncate_str(&result.content, 200),
                })),
            )),

            _ => None,
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

/// Events tagged with another run are skipped; untagged ones are kept.
fn concerns(event: &WorkflowEvent, run_id: &RunId) -> bool {
    match event {
        WorkflowEvent::RunStarted { run_id: id, .. }
        | WorkflowEvent::GuardrailsEvaluated { run_id: id, .. }
        | WorkflowEvent::RouteSelected { run_id: id, .. }
        | WorkflowEvent::NodeStarted { run_id: id, .. }
        | WorkflowEvent::NodeCompleted { run_id: id, .. }
        | WorkflowEvent::RunFinished { run_id: id, .. } => id == run_id,
        WorkflowEvent::ApprovalRequested { request } => request.run_id == run_id.0,
        _ => true,
    }
}

/// Truncate on a char boundary, marking the cut with "...".
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
