pub mod chunker;
pub mod conversation;
pub mod events;
pub mod knowledge;
pub mod llm;
pub mod retrieval;
pub mod store;
