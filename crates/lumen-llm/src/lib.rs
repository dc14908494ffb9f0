//! LLM and embedding providers.
//!
//! Every provider speaks plain HTTP through `reqwest`; the traits in
//! [`provider`] are object safe so collaborators can be held as
//! `Arc<dyn LlmProvider>` and swapped for stubs in tests.

pub mod ollama;
pub mod openai;
pub mod provider;
