use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::ChatMessage;
use crate::utils::error::ApiError;
use super::types::Conversation;

/// Thread-safe in-memory conversation store.
///
/// Every method runs inside the shard guard of its entry, so a read-modify-write on
/// one conversation is atomic with respect to every other call on the same id,
/// while different ids only contend when they hash to the same shard. Reads hand
/// out clones; no reference into the map escapes a call.
#[derive(Clone)]
pub struct ConversationStore {
    /// Conversation storage: id -> Conversation
    storage: Arc<DashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        info!("Initializing conversation store with DashMap");
        Self {
            storage: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of the conversation, creating an empty one for an unseen id
    pub fn get_or_create(&self, id: &str) -> Conversation {
        self.storage
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("Creating conversation {}", id);
                Conversation::new(id)
            })
            .value()
            .clone()
    }

    pub fn get(&self, id: &str) -> Result<Conversation, ApiError> {
        self.storage
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", id)))
    }

    /// Append to an existing conversation; returns the new message count
    pub fn append(&self, id: &str, message: ChatMessage) -> Result<usize, ApiError> {
        let mut entry = self
            .storage
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", id)))?;

        entry.messages.push(message);
        Ok(entry.messages.len())
    }

    /// Create-if-missing and append in one step; returns the state right after the append
    pub fn record_user_message(&self, id: &str, message: ChatMessage) -> Conversation {
        let mut entry = self
            .storage
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("Creating conversation {}", id);
                Conversation::new(id)
            });

        entry.messages.push(message);
        entry.value().clone()
    }

    /// Sets the title only if none has been set yet
    pub fn set_title_once(&self, id: &str, title: &str) -> bool {
        match self.storage.get_mut(id) {
            Some(mut entry) if entry.title.is_empty() && !title.is_empty() => {
                entry.title = title.to_string();
                true
            }
            _ => false,
        }
    }

    /// Overwrite the summary and keep at most `max_retained` of the newest messages.
    /// Returns the retained length, or None if the conversation is gone.
    pub fn commit_compaction(
        &self,
        id: &str,
        summary: String,
        max_retained: usize,
    ) -> Option<usize> {
        let mut entry = self.storage.get_mut(id)?;

        entry.summary = summary;
        let len = entry.messages.len();
        if len > max_retained {
            entry.messages.drain(..len - max_retained);
        }
        Some(entry.messages.len())
    }

    /// Remove a conversation; absent ids are a no-op. Returns whether one was removed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.storage.remove(id).is_some();
        if removed {
            debug!("Deleted conversation {}", id);
        }
        removed
    }

    /// Get number of live conversations
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_basic_operations() {
        let store = ConversationStore::new();

        let created = store.get_or_create("c1");
        assert_eq!(created, Conversation::new("c1"));
        assert_eq!(store.len(), 1);

        assert_eq!(store.append("c1", ChatMessage::user("Hello")).unwrap(), 1);
        assert_eq!(store.append("c1", ChatMessage::assistant("Hi")).unwrap(), 2);

        let conv = store.get("c1").unwrap();
        assert_eq!(conv.messages, vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi")]);

        // get_or_create does not reset existing state
        assert_eq!(store.get_or_create("c1").messages.len(), 2);

        assert!(store.delete("c1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_conversation() {
        let store = ConversationStore::new();
        assert!(matches!(store.get("nope"), Err(ApiError::NotFound(_))));
        assert!(matches!(
            store.append("nope", ChatMessage::user("x")),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = ConversationStore::new();
        assert!(!store.delete("ghost"));
        store.get_or_create("c1");
        assert!(store.delete("c1"));
        assert!(!store.delete("c1"));
    }

    #[test]
    fn test_record_user_message_returns_snapshot() {
        let store = ConversationStore::new();
        let snapshot = store.record_user_message("c1", ChatMessage::user("one"));
        assert_eq!(snapshot.messages, vec![ChatMessage::user("one")]);

        let snapshot = store.record_user_message("c1", ChatMessage::user("two"));
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[test]
    fn test_title_is_set_once() {
        let store = ConversationStore::new();
        store.get_or_create("c1");

        assert!(!store.set_title_once("c1", ""));
        assert!(store.set_title_once("c1", "First"));
        assert!(!store.set_title_once("c1", "Second"));
        assert_eq!(store.get("c1").unwrap().title, "First");
        assert!(!store.set_title_once("missing", "Title"));
    }

    #[test]
    fn test_commit_compaction_truncates_to_newest() {
        let store = ConversationStore::new();
        store.get_or_create("c1");
        for i in 0..60 {
            store.append("c1", ChatMessage::user(format!("m{}", i))).unwrap();
        }

        assert_eq!(store.commit_compaction("c1", "digest".to_string(), 50), Some(50));

        let conv = store.get("c1").unwrap();
        assert_eq!(conv.summary, "digest");
        assert_eq!(conv.messages.first().unwrap().content, "m10");
        assert_eq!(conv.messages.last().unwrap().content, "m59");

        // Overwrites, never concatenates
        store.commit_compaction("c1", "newer".to_string(), 50);
        assert_eq!(store.get("c1").unwrap().summary, "newer");

        assert_eq!(store.commit_compaction("missing", "x".to_string(), 50), None);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let store = ConversationStore::new();
        store.get_or_create("shared");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.append("shared", ChatMessage::user(format!("{}-{}", t, i))).unwrap();
                        store.record_user_message(&format!("own-{}", t), ChatMessage::user("x"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared").unwrap().messages.len(), 800);
        assert_eq!(store.get("own-3").unwrap().messages.len(), 100);
        assert_eq!(store.len(), 9);
    }
}
