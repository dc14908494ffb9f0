use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lumen_core::config::AuthConfig;
use serde::Serialize;
use serde_json::json;

use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user: User,
}

/// Resolves the caller's session from request headers.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Bearer tokens listed under `[[auth.tokens]]`.
pub struct StaticTokenSessions {
    users: HashMap<String, User>,
}

impl StaticTokenSessions {
    pub fn new(config: &AuthConfig) -> Self {
        let users = config
            .tokens
            .iter()
            .filter(|t| !t.token.is_empty())
            .map(|t| {
                (
                    t.token.clone(),
                    User {
                        id: t.user_id.clone(),
                        email: t.email.clone(),
                        name: t.name.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl SessionProvider for StaticTokenSessions {
    async fn session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = bearer_token(headers)?;
        self.users.get(token).map(|user| Session { user: user.clone() })
    }
}

/// Reject requests without a session; otherwise attach the [`Session`] to
/// the request extensions.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.sessions.session(req.headers()).await {
        Some(session) => {
            tracing::info!(
                user_id = %session.user.id,
                email = %session.user.email,
                "authenticated request"
            );
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            tracing::info!(path = %req.uri().path(), "rejecting unauthenticated request");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response()
        }
    }
}
