use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Extension;
use lumen_brain::brain::Turn;
use lumen_brain::stream::{StreamEvent, DATA_STREAM_HEADER, DATA_STREAM_VERSION};
use lumen_core::types::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::auth::Session;
use crate::server::AppState;

/// Recognise the request body.
///
/// `{ "id": string, "message": object }` continues a stored conversation
/// when the message parses. Anything else is read as a message list: the
/// `messages` array if present, keeping only the entries that parse, and an
/// empty list otherwise. Malformed input never fails the request.
pub fn parse_turn(body: &[u8]) -> Turn {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        tracing::debug!("chat body is not JSON, using an empty message list");
        return Turn::Messages(Vec::new());
    };

    if let (Some(Value::String(id)), Some(message @ Value::Object(_))) =
        (value.get("id"), value.get("message"))
    {
        match serde_json::from_value::<Message>(message.clone()) {
            Ok(message) => {
                return Turn::Conversation {
                    id: id.clone(),
                    message,
                }
            }
            Err(e) => tracing::debug!(chat_id = %id, "message does not parse, using message list: {e}"),
        }
    }

    let messages = value
        .get("messages")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match serde_json::from_value::<Message>(entry.clone()) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::debug!("skipping unparsable message: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    Turn::Messages(messages)
}

/// Stream events to the client as data-stream lines.
pub fn stream_response(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Response {
    let lines = UnboundedReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.encode()));
    let mut response = Response::new(Body::from_stream(lines));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(DATA_STREAM_HEADER, HeaderValue::from_static(DATA_STREAM_VERSION));
    response
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Response {
    let turn = parse_turn(&body);
    match &turn {
        Turn::Conversation { id, .. } => {
            tracing::info!(user_id = %session.user.id, chat_id = %id, "chat turn")
        }
        Turn::Messages(messages) => {
            tracing::info!(user_id = %session.user.id, messages = messages.len(), "chat message list")
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    // the observer outlives the response body
    drop(state.brain.start(turn, tx));
    stream_response(rx)
}
