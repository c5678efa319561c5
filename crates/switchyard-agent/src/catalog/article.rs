use switchyard_core::types::{FinalOutput, ReasoningEffort};

use crate::contract::{FieldKind, OutputContract};
use crate::node::AgentNode;
use crate::router::Router;
use crate::workflow::{ApprovalCheckpoint, Branch, Continuation, Workflow};

pub const NAME: &str = "article_writer";
pub const WORKFLOW_ID: &str = "wf_68ee9e7e567c81908fb36fa0c31f7a3b0662811a3dd1fa10";

const SUMMARIZER_INSTRUCTIONS: &str = r#"Generate an article on the given topic, then summarize the generated article in an easy-to-understand manner, using simple language that is accessible to a general audience.

- Begin by analyzing the topic and identifying its key points or core ideas. Consider what information is essential for someone unfamiliar with the subject.
- Organize your thoughts in a logical order to ensure clarity.
- Do not include the summary before you have reasoned through the key points; reasoning should come first, and the final summary should be presented last.
- Your summary should be brief, generally between 2 and 4 sentences, avoiding unnecessary details or jargon unless briefly defined.
- If the input topic is particularly complex, include a placeholder for technical terms or concepts ([EXPLAIN TERM]), and provide a more accessible explanation if necessary.

**Output Format:**
A valid JSON object with the following structure:
  "title": <title>
  "topic": <topic>
  "raw_content": <the actual article generated>
  "summary": <summary of the article>"#;

const FORMAT_INSTRUCTIONS: &str = "Format the provided input into clear, well-structured markdown suitable for display in a user interface (UI).
Preserve all original content; do not omit or summarize any information. \
Organize the content with appropriate markdown elements (such as headers, bullet points, numbered lists, bold, italics, or tables), ensuring a clean visual structure and enhanced readability. \
When encountering code snippets, enclose them in proper markdown code blocks, respecting the syntax if specified. \
For sections where structure is unclear, use your judgment to apply suitable markdown formatting that best clarifies or organizes the information.
Always review the result to ensure that:
- The content displays cleanly without markdown errors.
- Headings, lists, and sections are clearly and consistently formatted.
- Any technical or code content is properly rendered for user interaction.
- The output contains only the formatted markdown, with no narrative or extra commentary.";

pub fn summarizer() -> AgentNode {
    AgentNode::new("Summarizer", SUMMARIZER_INSTRUCTIONS)
        .with_output(
            OutputContract::new("Summarizer")
                .field("title", FieldKind::String)
                .field("topic", FieldKind::String)
                .field("raw_content", FieldKind::String)
                .field("summary", FieldKind::String),
        )
        .with_reasoning(ReasoningEffort::Low)
}

pub fn format_agent() -> AgentNode {
    AgentNode::new("Format Agent", FORMAT_INSTRUCTIONS)
        .with_output(
            OutputContract::new("FormatAgent")
                .field("topic", FieldKind::String)
                .field("title", FieldKind::String)
                .field("summaryMd", FieldKind::String),
        )
        .with_reasoning(ReasoningEffort::Low)
}

/// Render the summarizer's output for display.
pub fn render_summary(output: &FinalOutput) -> FinalOutput {
    let field = |name: &str| {
        output
            .field(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    FinalOutput::Text(format!(
        "📰 **{}**\nTopic: {}\n\n{}\n\n{}\n\n---\nGenerated by your Summarizer Agent",
        field("title"),
        field("topic"),
        field("summary"),
        field("raw_content"),
    ))
}

pub fn approval_message(output: &FinalOutput) -> String {
    format!("Would you like to proceed with this:\n   {}", output.to_text())
}

/// Summarize, render, and on approval reformat as markdown.
pub fn workflow() -> Workflow {
    Workflow::new(NAME, "article")
        .with_id(WORKFLOW_ID)
        .with_metadata("trace_name", "Article Writer & Summarizer")
        .with_router(Router::new("article"))
        .with_branch(
            Branch::new("article")
                .node(summarizer())
                .transform(render_summary)
                .approval(ApprovalCheckpoint::new(
                    approval_message,
                    Continuation::RunNode(format_agent()),
                    Continuation::ReturnCurrent,
                )),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_summary() {
        let output = FinalOutput::Structured(serde_json::json!({
            "title": "Otters",
            "topic": "Wildlife",
            "raw_content": "Otters hold hands.",
            "summary": "Otters are social."
        }));
        let rendered = render_summary(&output);
        assert_eq!(
            rendered.as_text().unwrap(),
            "📰 **Otters**\nTopic: Wildlife\n\nOtters are social.\n\nOtters hold hands.\n\n---\nGenerated by your Summarizer Agent"
        );
        assert!(approval_message(&rendered).starts_with("Would you like to proceed with this:\n   📰"));
    }

    #[test]
    fn test_workflow_has_no_classifier() {
        let wf = workflow();
        assert!(wf.classifier.is_none());
        assert!(wf.guardrails.is_empty());
        assert_eq!(wf.router.default_branch(), "article");
    }
}
