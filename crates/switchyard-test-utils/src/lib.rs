//! Mocks and fixtures shared by Switchyard's integration tests.

pub mod approval;
pub mod fixtures;
pub mod guard;
pub mod llm;

pub use approval::RecordingApproval;
pub use fixtures::{empty_pipeline, test_config, test_orchestrator};
pub use guard::{FailingEvaluator, StaticEvaluator};
pub use llm::{RecordedCall, ScriptedLlm, ScriptedReply};
