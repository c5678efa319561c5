use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::FinalOutput;
use switchyard_guard::GuardrailKind;

use crate::context::RunContext;
use crate::node::AgentNode;
use crate::router::Router;

type MessageFn = Arc<dyn Fn(&FinalOutput) -> String + Send + Sync>;
type TransformFn = Arc<dyn Fn(&FinalOutput) -> FinalOutput + Send + Sync>;

/// Node whose structured output picks the branch.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub node: AgentNode,
    /// Top-level field holding the classification string.
    pub field: String,
}

/// What happens after an approval decision.
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Run a further node and finish with its output.
    RunNode(AgentNode),
    /// Finish with fixed text.
    Reply(String),
    /// Finish with the output that was up for approval.
    ReturnCurrent,
}

#[derive(Clone)]
pub struct ApprovalCheckpoint {
    pub message: MessageFn,
    pub on_approve: Continuation,
    pub on_deny: Continuation,
}

impl ApprovalCheckpoint {
    pub fn new<F>(message: F, on_approve: Continuation, on_deny: Continuation) -> Self
    where
        F: Fn(&FinalOutput) -> String + Send + Sync + 'static,
    {
        Self {
            message: Arc::new(message),
            on_approve,
            on_deny,
        }
    }

    /// Same message whatever the output.
    pub fn fixed(message: impl Into<String>, on_approve: Continuation, on_deny: Continuation) -> Self {
        let message = message.into();
        Self::new(move |_| message.clone(), on_approve, on_deny)
    }
}

impl std::fmt::Debug for ApprovalCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCheckpoint")
            .field("on_approve", &self.on_approve)
            .field("on_deny", &self.on_deny)
            .finish_non_exhaustive()
    }
}

/// A named continuation of the workflow.
#[derive(Clone)]
pub struct Branch {
    pub id: String,
    /// Run strictly in order, each seeing the previous one's turns.
    pub nodes: Vec<AgentNode>,
    pub tolerate_tool_errors: bool,
    pub transform: Option<TransformFn>,
    pub approval: Option<ApprovalCheckpoint>,
}

impl Branch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: vec![],
            tolerate_tool_errors: false,
            transform: None,
            approval: None,
        }
    }

    pub fn node(mut self, node: AgentNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn tolerate_tool_errors(mut self) -> Self {
        self.tolerate_tool_errors = true;
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&FinalOutput) -> FinalOutput + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn approval(mut self, checkpoint: ApprovalCheckpoint) -> Self {
        self.approval = Some(checkpoint);
        self
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("id", &self.id)
            .field("nodes", &self.nodes.iter().map(|n| &n.name).collect::<Vec<_>>())
            .field("tolerate_tool_errors", &self.tolerate_tool_errors)
            .field("transform", &self.transform.is_some())
            .field("approval", &self.approval)
            .finish()
    }
}

/// Initial context values for every run.
#[derive(Debug, Clone, Default)]
pub struct ContextSeed {
    pub values: RunContext,
    /// Store the sanitized input under this key.
    pub input_key: Option<String>,
}

impl ContextSeed {
    pub fn build(&self, input: &str) -> RunContext {
        let mut ctx = self.values.clone();
        if let Some(key) = &self.input_key {
            ctx.set_str(key.clone(), input);
        }
        ctx
    }
}

/// A complete workflow definition, built once and run many times.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub workflow_id: Option<String>,
    /// Trace metadata attached to every run.
    pub metadata: BTreeMap<String, String>,
    /// Checks run against the raw input. Empty skips the guardrail stage.
    pub guardrails: Vec<GuardrailKind>,
    pub classifier: Option<Classifier>,
    pub router: Router,
    pub branches: Vec<Branch>,
    pub context: ContextSeed,
}

impl Workflow {
    /// A workflow whose only branch is the router default.
    pub fn new(name: impl Into<String>, default_branch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workflow_id: None,
            metadata: BTreeMap::new(),
            guardrails: vec![],
            classifier: None,
            router: Router::new(default_branch),
            branches: vec![],
            context: ContextSeed::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_guardrails(mut self, checks: &[GuardrailKind]) -> Self {
        self.guardrails = checks.to_vec();
        self
    }

    pub fn with_classifier(mut self, node: AgentNode, field: impl Into<String>) -> Self {
        self.classifier = Some(Classifier {
            node,
            field: field.into(),
        });
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.values.set(key, value);
        self
    }

    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.context.input_key = Some(key.into());
        self
    }

    pub fn branch(&self, id: &str) -> Result<&Branch> {
        self.branches
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| SwitchyardError::UnknownBranch(id.to_string()))
    }

    /// Trace metadata, with the workflow id when set.
    pub fn trace_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.metadata.clone();
        if let Some(id) = &self.workflow_id {
            metadata.insert("workflow_id".to_string(), id.clone());
        }
        metadata
    }

    /// Check the definition before any run uses it.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| SwitchyardError::InvalidWorkflow {
            workflow: self.name.clone(),
            message,
        };

        let mut branch_ids = HashSet::new();
        for branch in &self.branches {
            if !branch_ids.insert(branch.id.as_str()) {
                return Err(invalid(format!("duplicate branch '{}'", branch.id)));
            }
            if branch.nodes.is_empty() {
                return Err(invalid(format!("branch '{}' has no nodes", branch.id)));
            }
        }

        for target in self.router.targets() {
            if !branch_ids.contains(target) {
                return Err(SwitchyardError::UnknownBranch(target.to_string()));
            }
        }

        let mut names = HashSet::new();
        let classifier = self.classifier.iter().map(|c| &c.node);
        let branch_nodes = self.branches.iter().flat_map(|b| {
            b.nodes.iter().chain(b.approval.iter().flat_map(|a| {
                [&a.on_approve, &a.on_deny]
                    .into_iter()
                    .filter_map(|c| match c {
                        Continuation::RunNode(node) => Some(node),
                        _ => None,
                    })
            }))
        });
        for node in classifier.chain(branch_nodes) {
            if !names.insert(node.name.as_str()) {
                return Err(invalid(format!("duplicate node name '{}'", node.name)));
            }
        }

        if let Some(classifier) = &self.classifier {
            let declares_field = classifier
                .node
                .output
                .as_ref()
                .is_some_and(|c| c.fields.iter().any(|f| f.name == classifier.field));
            if !declares_field {
                return Err(invalid(format!(
                    "classifier '{}' must declare output field '{}'",
                    classifier.node.name, classifier.field
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::OutputContract;

    fn classifier() -> AgentNode {
        AgentNode::new("Classifier", "Classify.")
            .with_output(OutputContract::new("C").choice("classification", &["a"]))
    }

    fn valid() -> Workflow {
        Workflow::new("wf", "main")
            .with_id("wf_123")
            .with_classifier(classifier(), "classification")
            .with_router(Router::new("main").route_to("a", "side"))
            .with_branch(Branch::new("main").node(AgentNode::new("Main", "Do it.")))
            .with_branch(Branch::new("side").node(AgentNode::new("Side", "Do that.")))
    }

    #[test]
    fn test_valid_workflow() {
        let wf = valid();
        assert!(wf.validate().is_ok());
        assert_eq!(wf.branch("side").unwrap().nodes[0].name, "Side");
        assert!(matches!(wf.branch("nope"), Err(SwitchyardError::UnknownBranch(_))));
        assert_eq!(wf.trace_metadata()["workflow_id"], "wf_123");
    }

    #[test]
    fn test_router_target_must_exist() {
        let wf = valid().with_router(Router::new("main").route_to("a", "ghost"));
        assert!(matches!(wf.validate(), Err(SwitchyardError::UnknownBranch(b)) if b == "ghost"));
    }

    #[test]
    fn test_duplicate_node_names_rejected() {
        let wf = valid().with_branch(
            Branch::new("third")
                .node(AgentNode::new("Main", "dup"))
        );
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node name 'Main'"));
    }

    #[test]
    fn test_continuation_nodes_count_as_names() {
        let wf = valid().with_branch(Branch::new("gated").node(AgentNode::new("Draft", "d")).approval(
            ApprovalCheckpoint::fixed(
                "ok?",
                Continuation::RunNode(AgentNode::new("Side", "dup")),
                Continuation::ReturnCurrent,
            ),
        ));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_classifier_must_declare_field() {
        let wf = Workflow::new("wf", "main")
            .with_classifier(AgentNode::new("Classifier", "free text"), "classification")
            .with_branch(Branch::new("main").node(AgentNode::new("Main", "m")));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_context_seed_stores_input() {
        let wf = Workflow::new("story", "main")
            .with_context("num_tweets", serde_json::json!(2))
            .with_input_key("topic");
        let ctx = wf.context.build("space otters");
        assert_eq!(ctx.get_str("topic"), Some("space otters"));
        assert_eq!(ctx.get("num_tweets"), Some(&serde_json::json!(2)));
    }
}
