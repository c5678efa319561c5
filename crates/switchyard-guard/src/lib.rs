pub mod evaluator;
pub mod hallucination;
pub mod jailbreak;
mod judge;
pub mod moderation;
pub mod pii;
pub mod pipeline;
pub mod report;
pub mod result;

pub use evaluator::GuardrailEvaluator;
pub use hallucination::HallucinationGuardrail;
pub use jailbreak::JailbreakGuardrail;
pub use moderation::ModerationGuardrail;
pub use pii::PiiGuardrail;
pub use pipeline::{GuardrailOutcome, GuardrailPipeline};
pub use report::{build_failure_report, has_tripwire, safe_text, GuardrailReport};
pub use result::{GuardrailInfo, GuardrailKind, GuardrailResult};
