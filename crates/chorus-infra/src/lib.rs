//! Infrastructure layer for Chorus.
//!
//! Contains implementations of the seams defined in `chorus-core`: the
//! Ollama-compatible HTTP backend with its shared connection resources, and
//! the TOML seat config source.

pub mod config;
pub mod llm;
