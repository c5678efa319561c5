use switchyard_core::types::ReasoningEffort;
use switchyard_guard::GuardrailKind;
use switchyard_tools::DeclaredTool;

use crate::contract::OutputContract;
use crate::node::AgentNode;
use crate::router::Router;
use crate::workflow::{ApprovalCheckpoint, Branch, Continuation, Workflow};

pub const NAME: &str = "support_triage";
pub const WORKFLOW_ID: &str = "wf_68eds24964819092be4005e54b917c0e0a8e21244f1e26";

pub const RETENTION_TOOL: &str = "propose_retention_option";

pub const RETURN_APPROVAL_MESSAGE: &str = "Does this work for you?";
pub const RETURN_APPROVED_REPLY: &str = "Great! We'll ship it to you!";
pub const RETURN_DENIED_REPLY: &str = "Okay, you've chose to return the product.";

const FAQ_INSTRUCTIONS: &str = "You are a helpful assistant that answers user questions about a specific topic. \
Only provide answers based strictly on the information available in the provided documents within the database you have access to. \
Do not answer questions using outside knowledge or speculation. \
If the answer cannot be found in the documents, politely inform the user that the information is not available.";

const CLASSIFIER_INSTRUCTIONS: &str = "Classify each incoming user query according to its intent, selecting one of the following categories:
1. return_item - if the query is primarily about requesting a return or exchanging a purchased item.
2. get_information - if the user is asking for details, information, or clarification about a product, order, or service.
3. cancel_subscription - if the user wants to cancel, end, or stop an ongoing subscription or recurring service.

Make sure that JSON returns either \"return_item\", or \"cancel_subscription\" or \"get_information\". That's all.
---
**IMPORTANT:**
- Always classify queries using the categories above.";

const RETENTION_INSTRUCTIONS: &str = "You are a customer retention conversational agent whose goal is to prevent subscription cancellations. \
Ask for their current plan and reason for dissatisfaction.
Use the propose_retention_option to identify options to show to the customer.

Once you've received the options, pick the one that makes the most sense and present to the customer.

DO NOT ask to generate the response nor to submit the response; you do it all yourself.";

const RETURN_INSTRUCTIONS: &str = "Offer a replacement device with free shipping.";

/// Declaration of the retention capability. Computing offers is left to
/// whoever registers a real implementation under the same name.
pub fn retention_tool() -> DeclaredTool {
    DeclaredTool::new(
        RETENTION_TOOL,
        "Select an option to propose to a customer considering canceling their membership.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_status": { "type": "string" },
                "reason_for_cancellation": { "type": "string" },
                "options": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["customer_status", "reason_for_cancellation", "options"]
        }),
    )
}

pub fn classifier() -> AgentNode {
    AgentNode::new("Query Classifier", CLASSIFIER_INSTRUCTIONS)
        .with_output(OutputContract::new("QueryClassifier").choice(
            "classification",
            &["return_item", "cancel_subscription", "get_information"],
        ))
        .with_reasoning(ReasoningEffort::Low)
}

pub fn faq_agent() -> AgentNode {
    AgentNode::new("FAQ Agent", FAQ_INSTRUCTIONS)
        .with_model("mini")
        .with_reasoning(ReasoningEffort::Low)
}

pub fn retention_agent() -> AgentNode {
    AgentNode::new("Retention Agent", RETENTION_INSTRUCTIONS)
        .with_tools(&[RETENTION_TOOL])
        .with_reasoning(ReasoningEffort::Low)
}

pub fn return_agent() -> AgentNode {
    AgentNode::new("Return Agent", RETURN_INSTRUCTIONS)
        .with_model("mini")
        .with_temperature(1.0)
        .with_max_tokens(2048)
}

/// Jailbreak check, then classify and route to FAQ, returns or retention.
pub fn workflow() -> Workflow {
    let router = Router::new("faq")
        .route_to("return_item", "return")
        .route_to("cancel_subscription", "retention")
        .route_to("get_information", "faq");

    Workflow::new(NAME, "faq")
        .with_id(WORKFLOW_ID)
        .with_metadata("trace_name", "RAG - FAQ and Retention Agents")
        .with_guardrails(&[GuardrailKind::Jailbreak])
        .with_classifier(classifier(), "classification")
        .with_router(router)
        .with_branch(Branch::new("faq").node(faq_agent()))
        .with_branch(
            Branch::new("return").node(return_agent()).approval(ApprovalCheckpoint::fixed(
                RETURN_APPROVAL_MESSAGE,
                Continuation::Reply(RETURN_APPROVED_REPLY.to_string()),
                Continuation::Reply(RETURN_DENIED_REPLY.to_string()),
            )),
        )
        // The retention capability may be declaration-only; its failures go
        // back to the model as error results.
        .with_branch(
            Branch::new("retention")
                .node(retention_agent())
                .tolerate_tool_errors(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        let wf = workflow();
        assert_eq!(wf.router.route(Some("return_item")), "return");
        assert_eq!(wf.router.route(Some("cancel_subscription")), "retention");
        assert_eq!(wf.router.route(Some("get_information")), "faq");
        assert_eq!(wf.router.route(Some("something_else")), "faq");
        assert_eq!(wf.guardrails, vec![GuardrailKind::Jailbreak]);
        assert!(wf.branch("return").unwrap().approval.is_some());
        assert!(wf.branch("retention").unwrap().approval.is_none());
        assert_eq!(wf.trace_metadata()["workflow_id"], WORKFLOW_ID);
    }

    #[test]
    fn test_classifier_schema_enumerates_classes() {
        let schema = classifier().output.unwrap().to_json_schema();
        let choices = &schema["properties"]["classification"]["enum"];
        assert_eq!(choices.as_array().unwrap().len(), 3);
    }
}
