use std::sync::Mutex;

use futures::future::BoxFuture;

use switchyard_agent::approval::{ApprovalDecision, ApprovalGate};
use switchyard_core::error::Result;
use switchyard_core::types::ApprovalRequest;

/// Approval gate that answers with a fixed decision and remembers every request.
pub struct RecordingApproval {
    decision: ApprovalDecision,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl RecordingApproval {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn approving() -> Self {
        Self::new(ApprovalDecision::Approved)
    }

    pub fn denying() -> Self {
        Self::new(ApprovalDecision::Denied)
    }

    pub fn deferring() -> Self {
        Self::new(ApprovalDecision::Deferred)
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.message).collect()
    }
}

impl ApprovalGate for RecordingApproval {
    fn request_approval<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, Result<ApprovalDecision>> {
        self.requests.lock().unwrap().push(request.clone());
        let decision = self.decision;
        Box::pin(async move { Ok(decision) })
    }
}
