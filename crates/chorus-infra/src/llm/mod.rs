//! Model backend implementations.
//!
//! Contains the [`SeatBackend`](chorus_core::backend::SeatBackend)
//! implementation for Ollama-compatible servers and the
//! [`ResourceManager`](pool::ResourceManager) that owns its HTTP client.

pub mod ollama;
pub mod pool;

pub use ollama::OllamaBackend;
pub use pool::{PoolSettings, ResourceManager};
