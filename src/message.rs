//! Transcript messages - the input stream the tracker folds over.

use serde::{Deserialize, Serialize};

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    /// The narrator / game master side of the conversation.
    Narrator,
    /// The player side of the conversation.
    Player,
}

/// One immutable message in a conversation transcript.
///
/// Messages are ordered by `index`, starting at zero with no gaps. The full
/// ordered sequence is the conversation history; the tracker never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the history, starting at 0.
    pub index: u64,
    /// Who wrote the message.
    pub author: Author,
    /// The raw narrative text.
    pub text: String,
}

impl Message {
    /// Create a narrator message.
    pub fn narrator(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            author: Author::Narrator,
            text: text.into(),
        }
    }

    /// Create a player message.
    pub fn player(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            author: Author::Player,
            text: text.into(),
        }
    }
}

/// Build a narrator-only history from a list of lines, indexed in order.
///
/// Convenience for tests and for hosts that replay a stored transcript.
pub fn history_from_lines<S: AsRef<str>>(lines: &[S]) -> Vec<Message> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| Message::narrator(i as u64, line.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let m = Message::narrator(3, "The rain begins.");
        assert_eq!(m.index, 3);
        assert_eq!(m.author, Author::Narrator);
        assert_eq!(m.text, "The rain begins.");

        let p = Message::player(4, "I run for cover.");
        assert_eq!(p.author, Author::Player);
    }

    #[test]
    fn test_history_from_lines() {
        let history = history_from_lines(&["one", "two", "three"]);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].index, 0);
        assert_eq!(history[2].index, 2);
        assert_eq!(history[1].text, "two");
    }

    #[test]
    fn test_serde_round_trip() {
        let m = Message::player(7, "I open the door.");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
