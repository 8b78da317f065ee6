//! OpenAI provider implementation
//!
//! Embeddings and chat-completion based function documentation.

pub mod client;
pub mod documentation;
pub mod embedding;
pub mod types;

pub use client::OpenAIClient;
pub use documentation::OpenAIDocumentationProvider;
pub use embedding::OpenAIEmbeddingProvider;
