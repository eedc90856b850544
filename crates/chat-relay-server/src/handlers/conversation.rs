use crate::models::chat::ConversationQuery;
use crate::services::conversation::{Conversation, ConversationStore};
use crate::utils::error::ApiError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

fn require_id(query: ConversationQuery) -> Result<String, ApiError> {
    query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Conversation ID is required".to_string()))
}

/// `GET /conversation?id=..`
pub async fn get_conversation_handler(
    State(store): State<ConversationStore>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Conversation>, ApiError> {
    let id = require_id(query)?;
    store.get(&id).map(Json)
}

/// `DELETE /conversation/delete?id=..`; deleting an unknown id succeeds.
pub async fn delete_conversation_handler(
    State(store): State<ConversationStore>,
    Query(query): Query<ConversationQuery>,
) -> Result<StatusCode, ApiError> {
    let id = require_id(query)?;
    let removed = store.delete(&id);

    info!("Delete conversation: id={}, existed={}", id, removed);
    Ok(StatusCode::OK)
}
