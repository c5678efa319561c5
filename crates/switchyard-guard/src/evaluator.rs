use futures::future::BoxFuture;

use switchyard_core::error::Result;

use crate::result::{GuardrailKind, GuardrailResult};

/// A single safety check run against a piece of text.
///
/// Returning `Err` means the check could not run; the pipeline records it
/// without tripping.
pub trait GuardrailEvaluator: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn kind(&self) -> GuardrailKind;

    fn evaluate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<GuardrailResult>>;
}
