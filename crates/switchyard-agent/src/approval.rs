use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use switchyard_core::config::{ApprovalConfig, ApprovalMode};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::ApprovalRequest;

/// Answer to an approval checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied,
    /// No decision yet; the run ends as pending.
    Deferred,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Deferred => "deferred",
        }
    }
}

/// Pluggable yes/no checkpoint consulted before a branch commits.
pub trait ApprovalGate: Send + Sync + 'static {
    fn request_approval<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>>;
}

pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn request_approval<'a>(
        &'a self,
        _request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>> {
        Box::pin(async { Ok(ApprovalDecision::Approved) })
    }
}

pub struct AutoDeny;

impl ApprovalGate for AutoDeny {
    fn request_approval<'a>(
        &'a self,
        _request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>> {
        Box::pin(async { Ok(ApprovalDecision::Denied) })
    }
}

/// Denies when the checkpoint message mentions any configured term.
pub struct KeywordPolicy {
    deny_terms: Vec<String>,
}

impl KeywordPolicy {
    pub fn new(deny_terms: Vec<String>) -> Self {
        Self {
            deny_terms: deny_terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn decide(&self, message: &str) -> ApprovalDecision {
        let message = message.to_lowercase();
        if self.deny_terms.iter().any(|t| message.contains(t.as_str())) {
            ApprovalDecision::Denied
        } else {
            ApprovalDecision::Approved
        }
    }
}

impl ApprovalGate for KeywordPolicy {
    fn request_approval<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>> {
        Box::pin(async move { Ok(self.decide(&request.message)) })
    }
}

/// Pending approval requests answered out of band through oneshot channels.
///
/// The orchestrator publishes the request and resolution events.
#[derive(Default)]
pub struct ApprovalBroker {
    pending: Mutex<HashMap<String, (ApprovalRequest, oneshot::Sender<ApprovalDecision>)>>,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return the receiver to await.
    pub async fn request(&self, req: ApprovalRequest) -> oneshot::Receiver<ApprovalDecision> {
        let (tx, rx) = oneshot::channel();
        let id = req.id.clone();
        self.pending.lock().await.insert(id, (req, tx));
        rx
    }

    /// Answer a pending request. Returns false if the id is unknown.
    pub async fn respond(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let entry = self.pending.lock().await.remove(request_id);
        match entry {
            Some((_req, tx)) => {
                // receiver may be gone after a timeout
                let _ = tx.send(decision);
                true
            }
            None => false,
        }
    }

    pub async fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .await
            .values()
            .map(|(req, _)| req.clone())
            .collect()
    }

    /// Resolve a unique id prefix to the full request id.
    pub async fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        self.pending
            .lock()
            .await
            .keys()
            .find(|k| k.starts_with(prefix))
            .cloned()
    }

    async fn forget(&self, request_id: &str) {
        self.pending.lock().await.remove(request_id);
    }
}

/// Waits on an `ApprovalBroker` for an answer, deferring on timeout.
pub struct BrokeredApproval {
    broker: Arc<ApprovalBroker>,
    timeout: Duration,
}

impl BrokeredApproval {
    pub fn new(broker: Arc<ApprovalBroker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }
}

impl ApprovalGate for BrokeredApproval {
    fn request_approval<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>> {
        Box::pin(async move {
            let rx = self.broker.request(request.clone()).await;
            match tokio::time::timeout(self.timeout, rx).await {
                Ok(Ok(decision)) => Ok(decision),
                Ok(Err(_)) => {
                    warn!(request_id = %request.id, "Approval channel closed, deferring");
                    Ok(ApprovalDecision::Deferred)
                }
                Err(_) => {
                    info!(request_id = %request.id, timeout_secs = self.timeout.as_secs(), "Approval timed out, deferring");
                    self.broker.forget(&request.id).await;
                    Ok(ApprovalDecision::Deferred)
                }
            }
        })
    }
}

/// Build the gate for a non-interactive approval mode.
pub fn gate_from_config(config: &ApprovalConfig) -> Result<Arc<dyn ApprovalGate>> {
    match config.mode {
        ApprovalMode::Auto => Ok(Arc::new(AutoApprove)),
        ApprovalMode::Deny => Ok(Arc::new(AutoDeny)),
        ApprovalMode::Policy => Ok(Arc::new(KeywordPolicy::new(config.deny_terms.clone()))),
        ApprovalMode::Prompt => Err(SwitchyardError::Config(
            "approval mode 'prompt' needs an interactive gate".to_string(),
        )),
    }
}
