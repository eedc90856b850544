use serde::{Deserialize, Serialize};

use crate::models::chat::ChatMessage;

/// Prefix of the synthetic system message that carries the running summary upstream.
pub const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// Complete conversation state stored in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Caller-supplied key, fixed at creation
    pub id: String,

    /// Empty until the first turn completes, then never changed
    pub title: String,

    /// Chronological history, truncated only by compaction
    pub messages: Vec<ChatMessage>,

    /// Digest of messages dropped by compaction; overwritten on every compaction
    pub summary: String,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            messages: Vec::new(),
            summary: String::new(),
        }
    }

    /// Messages sent upstream for the next reply: the summary (if any) as a
    /// system message, then the retained history as-is.
    pub fn outbound_context(&self) -> Vec<ChatMessage> {
        let mut context = Vec::with_capacity(self.messages.len() + 1);

        if !self.summary.is_empty() {
            context.push(ChatMessage::system(format!("{}{}", SUMMARY_PREFIX, self.summary)));
        }

        context.extend(self.messages.iter().cloned());
        context
    }
}
