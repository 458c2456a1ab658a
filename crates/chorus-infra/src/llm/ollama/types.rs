//! Wire types for the Ollama generate endpoint.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// Always `false`; the backend returns one JSON document.
    pub stream: bool,
}

/// Non-streaming response body. Only the fields Chorus reads.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: Option<String>,
    /// Set by Ollama instead of `response` when the request failed.
    #[serde(default)]
    pub error: Option<String>,
}
