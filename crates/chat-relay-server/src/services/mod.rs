pub mod completion;
pub mod conversation;
pub mod llm_service;

pub use completion::{CompletionClient, CompletionStream};
pub use llm_service::LlmService;
