//! Retrieval-augmented chat: chunking, embedding, knowledge and conversation
//! storage, the tool set, and the multi-step generation loop that ties them
//! together.

pub mod brain;
pub mod service;
pub mod stream;
pub mod tool;

#[cfg(test)]
mod testing;
