use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConversationConfig;
use crate::models::chat::ChatMessage;
use crate::services::completion::CompletionClient;
use crate::utils::error::ApiError;
use crate::utils::token_estimator::TokenEstimator;
use super::store::ConversationStore;
use super::types::Conversation;

const SUMMARIZE_INSTRUCTION: &str =
    "Summarize the following conversation, highlighting key points and important information:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Estimate at or under the threshold
    UnderThreshold { estimated_tokens: usize },
    /// Over the threshold but nothing older than the recent window to summarize
    NothingToSummarize { estimated_tokens: usize },
    Compacted {
        estimated_tokens: usize,
        retained: usize,
    },
    /// Conversation deleted while the summary was being generated
    Vanished,
}

/// Decides after each turn whether old history is folded into the summary.
///
/// Lossy by construction: once truncated, old messages survive only through the
/// summary text.
pub struct CompactionPolicy {
    estimator: Arc<dyn TokenEstimator>,
    threshold: usize,
    keep_recent: usize,
    max_retained: usize,
    summary_max_tokens: usize,
}

impl CompactionPolicy {
    pub fn new(config: &ConversationConfig, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            threshold: config.summary_threshold,
            keep_recent: config.keep_recent,
            // Never drop messages the summary did not cover
            max_retained: config.max_retained.max(config.keep_recent),
            summary_max_tokens: config.summary_max_tokens,
        }
    }

    pub fn estimate(&self, conversation: &Conversation) -> usize {
        self.estimator.estimate_messages(&conversation.messages)
    }

    pub fn needs_compaction(&self, conversation: &Conversation) -> bool {
        self.estimate(conversation) > self.threshold
    }

    /// Summarization input: the instruction followed by everything but the newest
    /// `keep_recent` messages. None when that slice is empty.
    pub fn summarization_context(&self, conversation: &Conversation) -> Option<Vec<ChatMessage>> {
        let cutoff = conversation.messages.len().saturating_sub(self.keep_recent);
        if cutoff == 0 {
            return None;
        }

        let mut context = Vec::with_capacity(cutoff + 1);
        context.push(ChatMessage::system(SUMMARIZE_INSTRUCTION));
        context.extend(conversation.messages[..cutoff].iter().cloned());
        Some(context)
    }

    /// Run the policy against the current state of `id`.
    ///
    /// On error nothing is written: the previous summary and full history stay.
    pub async fn apply(
        &self,
        store: &ConversationStore,
        client: &dyn CompletionClient,
        id: &str,
    ) -> Result<CompactionOutcome, ApiError> {
        let snapshot = store.get(id)?;
        let estimated_tokens = self.estimate(&snapshot);

        if estimated_tokens <= self.threshold {
            debug!(
                "Conversation {} at ~{} tokens, under threshold {}",
                id, estimated_tokens, self.threshold
            );
            return Ok(CompactionOutcome::UnderThreshold { estimated_tokens });
        }

        let Some(context) = self.summarization_context(&snapshot) else {
            warn!(
                "Conversation {} over threshold (~{} tokens) with only {} messages, \
                 skipping compaction",
                id,
                estimated_tokens,
                snapshot.messages.len()
            );
            return Ok(CompactionOutcome::NothingToSummarize { estimated_tokens });
        };

        info!(
            "Compacting conversation {}: ~{} tokens, summarizing {} messages",
            id,
            estimated_tokens,
            context.len() - 1
        );

        let summary = client
            .stream(context, self.summary_max_tokens)
            .collect_text()
            .await?;
        let summary = summary.trim().to_string();

        if summary.is_empty() {
            return Err(ApiError::Upstream("summarization returned no text".to_string()));
        }

        match store.commit_compaction(id, summary, self.max_retained) {
            Some(retained) => {
                info!("Conversation {} compacted, {} messages retained", id, retained);
                Ok(CompactionOutcome::Compacted {
                    estimated_tokens,
                    retained,
                })
            }
            None => Ok(CompactionOutcome::Vanished),
        }
    }
}
