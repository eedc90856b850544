use std::sync::Arc;
use axum::extract::FromRef;

use crate::config::Settings;
use crate::services::completion::CompletionClient;
use crate::services::conversation::{ChatRelay, CompactionPolicy, ConversationStore};
use crate::utils::token_estimator::CharRatioEstimator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ConversationStore,
    pub relay: Arc<ChatRelay>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire store, compaction policy and relay around a completion client.
    pub fn new(settings: Settings, client: Arc<dyn CompletionClient>) -> Self {
        let store = ConversationStore::new();
        let policy = CompactionPolicy::new(
            &settings.conversation,
            Arc::new(CharRatioEstimator::default()),
        );
        let relay = Arc::new(ChatRelay::new(
            store.clone(),
            client,
            policy,
            &settings.conversation,
        ));

        Self {
            store,
            relay,
            settings: Arc::new(settings),
        }
    }
}

impl FromRef<AppState> for Arc<ChatRelay> {
    fn from_ref(state: &AppState) -> Self {
        state.relay.clone()
    }
}

impl FromRef<AppState> for ConversationStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
