//! HTTP surface: authentication gate, chat endpoint and the streamed
//! data-stream response.

pub mod auth;
pub mod chat;
pub mod server;
