use switchyard_core::types::ReasoningEffort;

use crate::node::{AgentNode, InstructionSource};
use crate::router::Router;
use crate::workflow::{Branch, Workflow};

pub const NAME: &str = "story_teller";
pub const WORKFLOW_ID: &str = "wf_68dqllz9ff8664788190a04336fe890177c802a189b3e3ac70c6";

pub const DEFAULT_NUM_TWEETS: u64 = 2;

pub fn story_teller() -> AgentNode {
    AgentNode::new(
        "Story Teller",
        InstructionSource::format(
            "Your job is to take the input topic {topic} from the previous node and create {num_tweets} 150-character-long tweets.\n\
             Make sure it's funny and include appropriate emojis.",
        ),
    )
    .with_reasoning(ReasoningEffort::Low)
}

/// The raw input becomes `topic`; `num_tweets` is seeded.
pub fn workflow() -> Workflow {
    Workflow::new(NAME, "story")
        .with_id(WORKFLOW_ID)
        .with_metadata("trace_name", "Story Teller")
        .with_router(Router::new("story"))
        .with_context("num_tweets", serde_json::json!(DEFAULT_NUM_TWEETS))
        .with_input_key("topic")
        .with_branch(Branch::new("story").node(story_teller()))
}
