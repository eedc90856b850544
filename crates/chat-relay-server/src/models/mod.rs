pub mod chat;

pub use chat::{ChatMessage, ChatQuery, ConversationQuery, Role};
