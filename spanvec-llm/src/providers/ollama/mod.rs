//! Ollama provider implementation (local models)

pub mod embedding;
pub mod types;

pub use embedding::OllamaEmbeddingProvider;
