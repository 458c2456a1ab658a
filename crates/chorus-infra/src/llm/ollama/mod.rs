//! Ollama `/api/generate` backend.

pub mod client;
pub mod types;

pub use client::OllamaBackend;
