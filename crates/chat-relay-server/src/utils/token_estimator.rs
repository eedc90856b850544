use crate::models::chat::ChatMessage;

/// Approximate token counting for conversation history.
///
/// Implementations only need to be consistent with themselves; the compaction
/// threshold is tuned against whatever estimate is plugged in.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text(&self, text: &str) -> usize;

    fn estimate_messages(&self, messages: &[ChatMessage]) -> usize;
}

/// Character-ratio heuristic: total text length divided by a fixed ratio (floor).
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_text(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }

    // Divides the sum, not each message, so short messages still add up.
    fn estimate_messages(&self, messages: &[ChatMessage]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        total_chars / self.chars_per_token
    }
}
