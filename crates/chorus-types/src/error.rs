use std::time::Duration;

use thiserror::Error;

use crate::seat::Seat;

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The per-call timeout or the batch deadline elapsed.
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Transport-level failure (DNS, refused connection, reset).
    #[error("network error: {message}")]
    Network { message: String },

    /// The backend answered, but with an error status or an unusable payload.
    #[error("backend error{}: {message}", status_suffix(.status))]
    Backend { status: Option<u16>, message: String },

    /// The caller built a request that can never succeed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The resource manager was shut down before or during the call.
    #[error("resource manager closed")]
    ManagerClosed,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl DispatchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Network and timeout failures are transient. Backend errors are only
    /// transient for 5xx and 429 responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Timeout { .. } | DispatchError::Network { .. } => true,
            DispatchError::Backend { status, .. } => {
                matches!(status, Some(s) if *s >= 500 || *s == 429)
            }
            DispatchError::InvalidRequest(_) | DispatchError::ManagerClosed => false,
        }
    }

    /// Short machine-readable kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::Network { .. } => "network",
            DispatchError::Backend { .. } => "backend",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::ManagerClosed => "manager_closed",
        }
    }
}

/// The terminal error of a seat call after the retry wrapper gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} (after {attempts} attempts)")]
pub struct SeatFailure {
    /// Last error observed.
    pub error: DispatchError,
    /// Number of attempts made, including the first.
    pub attempts: u32,
}

/// The synthesis call failed after its retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("synthesis via {seat} seat failed: {failure}")]
pub struct SynthesisError {
    pub seat: Seat,
    pub failure: SeatFailure,
}

/// Errors loading or validating seat definitions. Fatal to orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read seat config '{path}': {message}")]
    Read { path: String, message: String },

    #[error("failed to parse seat config: {0}")]
    Parse(String),

    #[error("seat '{0}' is not defined")]
    MissingSeat(Seat),

    #[error("invalid seat config: {0}")]
    Invalid(String),
}
