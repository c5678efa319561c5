//! Bundled workflows.

pub mod article;
pub mod story;
pub mod support;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_tools::ToolRegistry;

use crate::workflow::Workflow;

pub struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Workflow,
}

impl CatalogEntry {
    pub fn build(&self) -> Workflow {
        (self.build)()
    }
}

const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry {
        name: support::NAME,
        description: "Jailbreak-guarded support desk: FAQ, returns with approval, retention",
        build: support::workflow,
    },
    CatalogEntry {
        name: article::NAME,
        description: "Write and summarize an article, then format it as markdown once approved",
        build: article::workflow,
    },
    CatalogEntry {
        name: story::NAME,
        description: "Turn a topic into a handful of funny tweets",
        build: story::workflow,
    },
];

pub fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

pub fn names() -> Vec<&'static str> {
    ENTRIES.iter().map(|e| e.name).collect()
}

/// Build a bundled workflow by name.
pub fn build(name: &str) -> Result<Workflow> {
    ENTRIES
        .iter()
        .find(|e| e.name == name)
        .map(CatalogEntry::build)
        .ok_or_else(|| {
            SwitchyardError::Config(format!(
                "unknown workflow '{}' (available: {})",
                name,
                names().join(", ")
            ))
        })
}

/// Register the capabilities the bundled workflows declare.
///
/// They are declaration-only; register a real implementation under the same
/// name afterwards to replace one.
pub fn register_tools(registry: &mut ToolRegistry) {
    registry.register(support::retention_tool());
}
