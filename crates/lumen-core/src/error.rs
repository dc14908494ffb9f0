use thiserror::Error;

#[derive(Debug, Error)]
pub enum LumenError {
    #[error("llm error ({provider}): {message}")]
    Llm { provider: String, message: String },
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("http error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("tool error: {0}")]
    Tool(String),
    #[error("events api error: {0}")]
    Events(String),
    #[error("server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, LumenError>;
