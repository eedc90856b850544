//! Conversation memory management module
//!
//! Provides in-memory conversation state with:
//! - Per-conversation atomic updates (DashMap)
//! - History compaction into a running summary
//! - The streaming relay that drives one chat turn

mod compaction;
mod relay;
mod store;
pub mod types;

pub use compaction::{CompactionOutcome, CompactionPolicy};
pub use relay::{ChatRelay, RelayEvent};
pub use store::ConversationStore;
pub use types::Conversation;
