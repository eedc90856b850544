use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/chat", get(handlers::chat::chat_stream_handler))
        .route(
            "/conversation",
            get(handlers::conversation::get_conversation_handler)
                .delete(handlers::conversation::delete_conversation_handler),
        )
        .route(
            "/conversation/delete",
            delete(handlers::conversation::delete_conversation_handler),
        );

    // Frontend assets, only when configured
    if let Some(dir) = &state.settings.server.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }
    if let Some(index) = &state.settings.server.index_file {
        router = router.route_service("/", ServeFile::new(index));
    }

    router
        .with_state(state)
        .layer(CatchPanicLayer::new())
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::chat::ChatMessage;
    use crate::services::completion::{CompletionStream, MockCompletionClient, StreamItem};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(client: MockCompletionClient) -> (Router, AppState) {
        let state = AppState::new(Settings::default(), Arc::new(client));
        (build_router(state.clone()), state)
    }

    fn greeting_client() -> MockCompletionClient {
        let mut client = MockCompletionClient::new();
        client
            .expect_stream()
            .withf(|_, max_tokens| *max_tokens == 1000)
            .returning(|_, _| {
                CompletionStream::from_items(vec![
                    StreamItem::Fragment("Hi".to_string()),
                    StreamItem::Fragment(" there".to_string()),
                    StreamItem::Done,
                ])
            });
        client
            .expect_stream()
            .withf(|_, max_tokens| *max_tokens == 20)
            .returning(|_, _| {
                CompletionStream::from_items(vec![
                    StreamItem::Fragment("Greeting".to_string()),
                    StreamItem::Done,
                ])
            });
        client
    }

    async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_chat_streams_events_in_order() {
        let (app, state) = app_with(greeting_client());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/chat?conversationId=c1&message=Hello")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        let first = body.find(r#"data: {"content":"Hi"}"#).unwrap();
        let second = body.find(r#"data: {"content":" there"}"#).unwrap();
        let title = body.find(r#"data: {"event":"title","title":"Greeting"}"#).unwrap();
        let done = body.find("data: [DONE]").unwrap();
        assert!(first < second && second < title && title < done);

        let conv = state.store.get("c1").unwrap();
        assert_eq!(
            conv.messages,
            vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi there")]
        );
        assert_eq!(conv.title, "Greeting");
    }

    #[tokio::test]
    async fn test_chat_rejects_missing_fields_without_stream() {
        // No expectations: any upstream call would panic
        let (app, state) = app_with(MockCompletionClient::new());

        let (status, body) = send(&app, Method::GET, "/chat?conversationId=c1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("InvalidRequest"));

        let (status, _) = send(&app, Method::GET, "/chat?conversationId=&message=Hi").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_read_after_turn_round_trips() {
        let (app, _) = app_with(greeting_client());
        send(&app, Method::GET, "/chat?conversationId=c1&message=Hello").await;

        let (status, body) = send(&app, Method::GET, "/conversation?id=c1").await;
        assert_eq!(status, StatusCode::OK);

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "c1",
                "title": "Greeting",
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi there"},
                ],
                "summary": "",
            })
        );
    }

    #[tokio::test]
    async fn test_conversation_lookup_errors() {
        let (app, _) = app_with(MockCompletionClient::new());

        let (status, _) = send(&app, Method::GET, "/conversation?id=missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/conversation").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (app, state) = app_with(MockCompletionClient::new());
        state.store.get_or_create("c1");

        let (status, _) = send(&app, Method::DELETE, "/conversation/delete?id=c1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.get("c1").is_err());

        let (status, _) = send(&app, Method::DELETE, "/conversation/delete?id=c1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, "/conversation?id=never").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, "/conversation/delete").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, state) = app_with(MockCompletionClient::new());
        state.store.get_or_create("a");

        let (status, body) = send(&app, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));

        let (status, body) = send(&app, Method::GET, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""conversations":1"#));
    }
}
