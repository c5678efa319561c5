use serde::Serialize;

use crate::types::{Origin, Turn};

/// Append-only conversation record shared by every node of one run.
///
/// Turns can only be appended. The turn sequence is the only context handed
/// to the next node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transcript with a single user turn.
    pub fn seeded(input: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(input)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Turns appended at or after `mark` (a previous `len()`).
    pub fn since(&self, mark: usize) -> &[Turn] {
        &self.turns[mark.min(self.turns.len())..]
    }

    /// Turns produced by a given node, in order.
    pub fn by_origin<'a>(&'a self, origin: &'a Origin) -> impl Iterator<Item = &'a Turn> + 'a {
        self.turns.iter().filter(move |t| &t.origin == origin)
    }

    /// Copy of the turns, for handing to a model request.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}
