//! Transcript: the ordered, append-only log of exchanged messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot => write!(f, "bot"),
            Self::User => write!(f, "user"),
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// Strictly increasing, starting at 1.
    pub sequence: u64,
    pub sent_at: DateTime<Utc>,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

/// Append-only message log. There is deliberately no removal operation.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    next_sequence: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its sequence number.
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.messages.push(Message {
            sender,
            text: text.into(),
            sequence,
            sent_at: Utc::now(),
        });
        sequence
    }

    /// Forward-only read in insertion order. Call again to restart from the
    /// first message.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render as `sender: text` lines, the shape tests and logs compare against.
    pub fn lines(&self) -> Vec<String> {
        self.iter().map(ToString::to_string).collect()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_increasing_sequence() {
        let mut transcript = Transcript::new();
        let a = transcript.append(Sender::Bot, "Hi, what's your name?");
        let b = transcript.append(Sender::User, "Jane Doe");
        let c = transcript.append(Sender::Bot, "Thanks, Jane Doe.");
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }

    #[test]
    fn read_back_matches_call_order() {
        let mut transcript = Transcript::new();
        let texts = ["one", "two", "three", "four"];
        for (i, text) in texts.iter().enumerate() {
            let sender = if i % 2 == 0 { Sender::Bot } else { Sender::User };
            transcript.append(sender, *text);
        }

        let read: Vec<&str> = transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(read, texts);

        let sequences: Vec<u64> = transcript.iter().map(|m| m.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn read_is_restartable() {
        let mut transcript = Transcript::new();
        transcript.append(Sender::Bot, "first");
        transcript.append(Sender::Bot, "second");

        let mut partial = transcript.iter();
        assert_eq!(partial.next().unwrap().text, "first");

        // A fresh read starts over at index 0.
        let again: Vec<_> = transcript.iter().collect();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].text, "first");
    }

    #[test]
    fn lines_render_sender_prefix() {
        let mut transcript = Transcript::new();
        transcript.append(Sender::Bot, "Hi, what's your name?");
        transcript.append(Sender::User, "A");
        assert_eq!(
            transcript.lines(),
            vec!["bot: Hi, what's your name?", "user: A"]
        );
    }

    #[test]
    fn empty_transcript() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert!(transcript.last().is_none());
        assert_eq!((&transcript).into_iter().count(), 0);
    }
}
