use serde::Serialize;

use crate::constants::ASSISTANT_MARKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when the turn is replayed to the model.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Builds the assistant turn for a raw model reply, dropping a leading role marker.
    pub fn assistant_reply(raw: &str) -> Self {
        Self {
            role: Role::Assistant,
            text: strip_role_marker(raw).to_string(),
        }
    }
}

/// Removes a leading `Assistant:` marker and the whitespace around it.
/// Replies without the marker come back untouched.
pub fn strip_role_marker(reply: &str) -> &str {
    match reply.trim_start().strip_prefix(ASSISTANT_MARKER) {
        Some(rest) => rest.trim(),
        None => reply,
    }
}

/// Append-only conversation memory replayed into every prompt.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
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

    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_role_marker() {
        assert_eq!(strip_role_marker("Assistant: OK"), "OK");
        assert_eq!(strip_role_marker("  Assistant:\n\nHere it is \n"), "Here it is");
        assert_eq!(strip_role_marker("Assistant:"), "");
    }

    #[test]
    fn test_strip_role_marker_leaves_other_replies() {
        assert_eq!(strip_role_marker("Sure, Assistant: here"), "Sure, Assistant: here");
        assert_eq!(strip_role_marker(" plain reply "), " plain reply ");
        assert_eq!(strip_role_marker("assistant: lowercase"), "assistant: lowercase");
    }

    #[test]
    fn test_assistant_reply_turn() {
        let turn = Turn::assistant_reply("Assistant: done");
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.text, "done");
    }

    #[test]
    fn test_render_transcript() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.render(), "");
        assert!(transcript.is_empty());

        transcript.push(Turn::user("hi"));
        transcript.push(Turn::assistant_reply("Assistant: hello"));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.render(), "Human: hi\nAssistant: hello");
        assert_eq!(transcript.turns()[0].role, Role::User);
    }
}
