use futures::stream::Stream;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ConversationConfig;
use crate::models::chat::{ChatMessage, ChatQuery};
use crate::services::completion::{CompletionClient, StreamItem};
use crate::utils::error::ApiError;
use super::compaction::CompactionPolicy;
use super::store::ConversationStore;

/// What the caller sees of a turn, in order. `Done` is always the last item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Title(String),
    Error(String),
    Done,
}

/// Drives chat turns: store → upstream → caller, then title and compaction.
pub struct ChatRelay {
    store: ConversationStore,
    client: Arc<dyn CompletionClient>,
    policy: CompactionPolicy,
    max_response_tokens: usize,
    title_max_tokens: usize,
}

impl ChatRelay {
    pub fn new(
        store: ConversationStore,
        client: Arc<dyn CompletionClient>,
        policy: CompactionPolicy,
        config: &ConversationConfig,
    ) -> Self {
        Self {
            store,
            client,
            policy,
            max_response_tokens: config.max_response_tokens,
            title_max_tokens: config.title_max_tokens,
        }
    }

    /// Extract `(conversation_id, message)`; both must be present and non-empty.
    pub fn validate(query: ChatQuery) -> Result<(String, String), ApiError> {
        match (query.conversation_id, query.message) {
            (Some(id), Some(message)) if !id.is_empty() && !message.is_empty() => Ok((id, message)),
            _ => Err(ApiError::InvalidRequest(
                "Missing conversationId or message".to_string(),
            )),
        }
    }

    /// One turn as a stream of events.
    ///
    /// Dropping the stream mid-turn drops the upstream reader, which stops the
    /// producer; nothing from the unfinished reply is stored. Once the reply is
    /// stored, title generation and compaction finish even without a reader.
    pub fn run_turn(
        self: Arc<Self>,
        id: String,
        message: String,
    ) -> impl Stream<Item = RelayEvent> + Send + 'static {
        let relay = self;

        async_stream::stream! {
            let started = Instant::now();

            // ===== STEP 1: Record user message =====
            let snapshot = relay.store.record_user_message(&id, ChatMessage::user(message));
            let context = snapshot.outbound_context();

            debug!(
                "Turn started: conversation={}, history={}, has_summary={}",
                id,
                snapshot.messages.len(),
                !snapshot.summary.is_empty()
            );

            // ===== STEP 2: Relay upstream fragments =====
            let mut upstream = relay.client.stream(context, relay.max_response_tokens);
            let mut reply = String::new();

            loop {
                match upstream.recv().await {
                    StreamItem::Fragment(fragment) => {
                        reply.push_str(&fragment);
                        yield RelayEvent::Content(fragment);
                    }
                    StreamItem::Done => break,
                    StreamItem::Failed(err) => {
                        warn!("Upstream failed for conversation {}: {}", id, err);
                        yield RelayEvent::Error(err.to_string());
                        yield RelayEvent::Done;
                        return;
                    }
                }
            }

            // ===== STEP 3: Persist assistant reply =====
            let count = match relay.store.append(&id, ChatMessage::assistant(reply)) {
                Ok(count) => count,
                Err(e) => {
                    warn!("Could not store reply for conversation {}: {}", id, e);
                    yield RelayEvent::Error(e.to_string());
                    yield RelayEvent::Done;
                    return;
                }
            };

            // ===== STEP 4: Title and compaction =====
            // Runs as its own task so a caller hanging up here cannot cancel it
            let first_message = (count == 2)
                .then(|| snapshot.messages.first().map(|m| m.content.clone()))
                .flatten();
            let follow_up = tokio::spawn(relay.clone().finish_turn(id.clone(), first_message));

            match follow_up.await {
                Ok(Some(title)) => {
                    yield RelayEvent::Title(title);
                }
                Ok(None) => {}
                Err(e) => warn!("Follow-up work for conversation {} failed: {}", id, e),
            }

            info!(
                "Turn completed: conversation={}, messages={}, elapsed={}ms",
                id,
                count,
                started.elapsed().as_millis()
            );

            yield RelayEvent::Done;
        }
    }

    /// Title (first turn only) then compaction. Returns the title if this turn set it.
    async fn finish_turn(
        self: Arc<Self>,
        id: String,
        first_message: Option<String>,
    ) -> Option<String> {
        let mut titled = None;

        if let Some(first_message) = first_message {
            if let Some(title) = self.generate_title(&first_message).await {
                if self.store.set_title_once(&id, &title) {
                    info!("Conversation {} titled {:?}", id, title);
                    titled = Some(title);
                }
            }
        }

        match self.policy.apply(&self.store, self.client.as_ref(), &id).await {
            Ok(outcome) => debug!("Compaction for {}: {:?}", id, outcome),
            Err(e) => warn!("Compaction skipped for conversation {}: {}", id, e),
        }

        titled
    }

    /// Short side query seeded only with the first user message. None on failure.
    async fn generate_title(&self, first_message: &str) -> Option<String> {
        let prompt = ChatMessage::user(format!(
            "Generate a brief, catchy title (5 words or less) for a conversation \
             starting with this message: '{}'",
            first_message
        ));

        match self
            .client
            .stream(vec![prompt], self.title_max_tokens)
            .collect_text()
            .await
        {
            Ok(text) => {
                let title = text.trim().trim_matches('"').trim();
                (!title.is_empty()).then(|| title.to_string())
            }
            Err(e) => {
                warn!("Title generation failed: {}", e);
                None
            }
        }
    }
}
