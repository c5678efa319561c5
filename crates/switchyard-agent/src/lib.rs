pub mod approval;
pub mod catalog;
pub mod context;
pub mod contract;
pub mod node;
pub mod orchestrator;
pub mod outcome;
pub mod router;
pub mod run_log;
pub mod runner;
pub mod workflow;

pub use approval::{
    gate_from_config, ApprovalBroker, ApprovalDecision, ApprovalGate, AutoApprove, AutoDeny,
    BrokeredApproval, KeywordPolicy,
};
pub use context::RunContext;
pub use contract::{FieldKind, FieldSpec, OutputContract};
pub use node::{AgentNode, InstructionSource, ModelSettings, NodeResult};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use outcome::{AbortReason, RunOutcome, RunRecord, GENERIC_FAILURE};
pub use router::Router;
pub use run_log::RunLogger;
pub use runner::NodeRunner;
pub use workflow::{ApprovalCheckpoint, Branch, Classifier, Continuation, ContextSeed, Workflow};
