use serde::{Deserialize, Serialize};

// ===== CONVERSATION MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of a conversation; also the upstream wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

// ===== REQUEST MODELS =====

/// Query string of `GET /chat`. Fields are optional so that missing values
/// are reported as `InvalidRequest` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub id: Option<String>,
}

// ===== RESPONSE EVENT MODELS =====

#[derive(Debug, Serialize)]
pub struct ContentEvent<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TitleEvent<'a> {
    pub event: &'static str,
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ErrorEvent<'a> {
    pub error: &'a str,
}
