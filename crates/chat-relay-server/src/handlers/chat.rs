use crate::models::chat::{ChatQuery, ContentEvent, ErrorEvent, TitleEvent};
use crate::services::conversation::{ChatRelay, RelayEvent};
use crate::utils::error::ApiError;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

/// Sentinel data of the last event of every turn.
pub const DONE_SENTINEL: &str = "[DONE]";

/// `GET /chat?conversationId=..&message=..`
///
/// Input is validated before the stream opens; after that every outcome,
/// including upstream failures, is reported inside the stream.
pub async fn chat_stream_handler(
    State(relay): State<Arc<ChatRelay>>,
    Query(query): Query<ChatQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (conversation_id, message) = ChatRelay::validate(query)?;

    info!(
        "Chat request: conversation={}, message_len={}",
        conversation_id,
        message.len()
    );

    let stream = relay
        .run_turn(conversation_id, message)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &RelayEvent) -> Event {
    match event {
        RelayEvent::Content(content) => json_event(&ContentEvent { content }),
        RelayEvent::Title(title) => json_event(&TitleEvent {
            event: "title",
            title,
        }),
        RelayEvent::Error(error) => json_event(&ErrorEvent { error }),
        RelayEvent::Done => Event::default().data(DONE_SENTINEL),
    }
}

// Helper: data-only SSE event carrying JSON
fn json_event<T: serde::Serialize>(data: &T) -> Event {
    Event::default().data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
