use std::future::Future;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use lumen_brain::brain::Brain;
use lumen_core::config::ServerConfig;
use lumen_core::error::{LumenError, Result};
use tower_http::trace::TraceLayer;

use crate::auth::{require_session, SessionProvider};
use crate::chat;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub brain: Arc<Brain>,
    pub sessions: Arc<dyn SessionProvider>,
}

async fn health() -> &'static str {
    "ok"
}

/// Build the router. `/api/chat` sits behind the session gate.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/chat", post(chat::chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` completes. In-flight generations keep running in
/// their own tasks.
pub async fn serve(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LumenError::Server(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| LumenError::Server(format!("server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenSessions;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use lumen_brain::service::conversation::InMemoryConversationStore;
    use lumen_brain::service::events::EventsClient;
    use lumen_brain::service::knowledge::InMemoryKnowledgeStore;
    use lumen_brain::service::llm::Embedder;
    use lumen_brain::service::retrieval::RetrievalService;
    use lumen_brain::tool::ToolRegistry;
    use lumen_core::config::{AuthConfig, AuthToken, EventsConfig, RetrievalConfig};
    use lumen_core::types::{ChatRequest, ChatResponse, ToolDefinition};
    use lumen_llm::provider::{EmbeddingProvider, LlmProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        async fn chat_with_tools(
            &self,
            _request: ChatRequest,
            _tools: &[ToolDefinition],
        ) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: "Hello from the model".to_string(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FixedEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn app(llm: Arc<CountingLlm>) -> Router {
        let retrieval = Arc::new(RetrievalService::new(
            Arc::new(Embedder::new(Arc::new(FixedEmbedding))),
            Arc::new(InMemoryKnowledgeStore::new()),
            &RetrievalConfig::default(),
        ));
        let tools = Arc::new(ToolRegistry::new(
            retrieval,
            Arc::new(EventsClient::new(&EventsConfig::default())),
        ));
        let brain = Arc::new(Brain::new(
            llm,
            tools,
            Arc::new(InMemoryConversationStore::new()),
            5,
            Duration::from_secs(30),
        ));
        let sessions = StaticTokenSessions::new(&AuthConfig {
            tokens: vec![AuthToken {
                token: "secret".into(),
                user_id: "u1".into(),
                email: "ada@example.com".into(),
                name: "Ada".into(),
            }],
        });
        build_router(Arc::new(AppState {
            brain,
            sessions: Arc::new(sessions),
        }))
    }

    fn chat_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/chat");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_unauthenticated_request_never_reaches_the_model() {
        let llm = Arc::new(CountingLlm::default());
        let response = app(llm.clone())
            .oneshot(chat_request(None, r#"{ "messages": [] }"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Unauthorized" }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let llm = Arc::new(CountingLlm::default());
        let response = app(llm.clone())
            .oneshot(chat_request(Some("guess"), "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_object_body_still_streams() {
        let llm = Arc::new(CountingLlm::default());
        let response = app(llm.clone())
            .oneshot(chat_request(Some("secret"), "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert!(lines[0].starts_with("f:"));
        assert!(lines.contains(&"0:\"Hello from the model\""));
        assert!(lines.last().unwrap().starts_with("d:"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = app(Arc::new(CountingLlm::default()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
