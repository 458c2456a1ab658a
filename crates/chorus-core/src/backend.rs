//! SeatBackend trait definition.
//!
//! This is the seam between the orchestrator and whatever actually talks to a
//! model server. The HTTP implementation lives in chorus-infra; tests use
//! scripted in-memory backends.

use std::time::Duration;

use chorus_types::error::DispatchError;
use chorus_types::seat::Seat;

/// A single, fully resolved backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub seat: Seat,
    pub model: String,
    pub prompt: String,
    /// Base URL of the backend, e.g. `http://127.0.0.1:11434`.
    pub host: String,
    pub timeout: Duration,
}

impl BackendCall {
    /// Reject calls that can never succeed. These are caller errors and are
    /// never retried.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.prompt.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(format!(
                "empty prompt for {} seat",
                self.seat
            )));
        }
        if self.timeout.is_zero() {
            return Err(DispatchError::InvalidRequest(format!(
                "zero timeout for {} seat",
                self.seat
            )));
        }
        if self.model.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(format!(
                "no model configured for {} seat",
                self.seat
            )));
        }
        if self.host.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(format!(
                "no host configured for {} seat",
                self.seat
            )));
        }
        Ok(())
    }
}

/// Trait for model-inference backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). One call per
/// invocation; retries and timeouts are layered on top by the retry wrapper,
/// but implementations should also honour `call.timeout` themselves so the
/// underlying socket work is bounded.
pub trait SeatBackend: Send + Sync + 'static {
    /// Human-readable backend name (e.g. "ollama-http").
    fn name(&self) -> &str;

    /// Generate text for one call.
    fn generate(
        &self,
        call: &BackendCall,
    ) -> impl std::future::Future<Output = Result<String, DispatchError>> + Send;
}
