pub mod settings;

pub use settings::{ConversationConfig, LlmConfig, LoggingConfig, ServerConfig, Settings};
