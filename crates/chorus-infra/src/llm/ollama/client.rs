//! OllamaBackend -- concrete [`SeatBackend`] for Ollama-compatible servers.
//!
//! Each call is a single non-streaming `POST {host}/api/generate`. The HTTP
//! client comes from the shared [`ResourceManager`]; shutting the manager
//! down cancels calls still in flight.

use std::sync::Arc;
use std::time::Duration;

use chorus_core::backend::{BackendCall, SeatBackend};
use chorus_types::error::DispatchError;

use super::types::{GenerateRequest, GenerateResponse};
use crate::llm::pool::ResourceManager;

/// Longest backend error body carried into a [`DispatchError`].
const MAX_ERROR_BODY: usize = 512;

pub struct OllamaBackend {
    resources: Arc<ResourceManager>,
}

impl OllamaBackend {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    fn url(host: &str) -> String {
        format!("{}/api/generate", host.trim_end_matches('/'))
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        call: &BackendCall,
    ) -> Result<String, DispatchError> {
        let body = GenerateRequest {
            model: &call.model,
            prompt: &call.prompt,
            stream: false,
        };

        let response = client
            .post(Self::url(&call.host))
            .timeout(call.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, call.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, call.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GenerateResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| truncate(&text, MAX_ERROR_BODY));
            return Err(DispatchError::Backend {
                status: Some(status.as_u16()),
                message,
            });
        }

        parse_generate_body(&text, status.as_u16())
    }
}

impl SeatBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, call: &BackendCall) -> Result<String, DispatchError> {
        let client = self.resources.client()?;
        let cancel = self.resources.cancellation();

        tokio::select! {
            _ = cancel.cancelled() => Err(DispatchError::ManagerClosed),
            result = self.send(&client, call) => result,
        }
    }
}

/// Extract the generated text from a 2xx body. JSON documents must carry a
/// non-empty `response`; anything that is not JSON is taken as plain text.
fn parse_generate_body(text: &str, status: u16) -> Result<String, DispatchError> {
    match serde_json::from_str::<GenerateResponse>(text) {
        Ok(GenerateResponse {
            response: Some(response),
            ..
        }) if !response.trim().is_empty() => Ok(response),
        Ok(GenerateResponse {
            error: Some(error), ..
        }) => Err(DispatchError::Backend {
            status: Some(status),
            message: error,
        }),
        Ok(_) => Err(DispatchError::Backend {
            status: Some(status),
            message: "empty response".to_string(),
        }),
        Err(_) if !text.trim().is_empty() && !text.trim_start().starts_with('{') => {
            Ok(text.trim().to_string())
        }
        Err(e) => Err(DispatchError::Backend {
            status: Some(status),
            message: format!("unreadable response body: {e}"),
        }),
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout { after: timeout }
    } else {
        DispatchError::Network {
            message: error_chain(&err),
        }
    }
}

/// Join an error and its sources with `": "`. reqwest's own message leaves
/// out the cause (refused connection, failed DNS lookup).
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
