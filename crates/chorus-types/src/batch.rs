//! Batch request/result types and the options that govern one batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, SeatFailure};
use crate::seat::Seat;

/// One seat call to be dispatched as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRequest {
    pub seat: Seat,
    pub prompt: String,
    /// Overrides the batch and seat default timeouts.
    pub timeout: Option<Duration>,
    /// Overrides the seat's configured host.
    pub host: Option<String>,
    /// Overrides the batch retry count.
    pub max_retries: Option<u32>,
}

impl SeatRequest {
    pub fn new(seat: Seat, prompt: impl Into<String>) -> Self {
        Self {
            seat,
            prompt: prompt.into(),
            timeout: None,
            host: None,
            max_retries: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Terminal outcome of one [`SeatRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatResult {
    /// Position of the originating request in the batch input.
    pub index: usize,
    pub seat: Seat,
    /// Generated text, or the last error observed.
    pub outcome: Result<String, DispatchError>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Wall-clock time from dispatch to terminal state.
    pub latency: Duration,
}

impl SeatResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn content(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&DispatchError> {
        self.outcome.as_ref().err()
    }

    /// The failure with its attempt count, for reporting.
    pub fn failure(&self) -> Option<SeatFailure> {
        self.error().map(|error| SeatFailure {
            error: error.clone(),
            attempts: self.attempts,
        })
    }
}

/// Shape of the delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `base * n` before retry `n`.
    Linear,
    /// `base * 2^(n-1)` before retry `n`.
    Exponential,
}

/// Delay policy between attempts. No jitter; delays never decrease and
/// never exceed `max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_backoff_kind")]
    pub kind: BackoffKind,
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

fn default_backoff_kind() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    4_000
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            kind: default_backoff_kind(),
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never waits. Useful in tests and for local backends.
    pub fn none() -> Self {
        Self {
            kind: BackoffKind::Linear,
            base_ms: 0,
            max_ms: 0,
        }
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let ms = match self.kind {
            BackoffKind::Linear => self.base_ms.saturating_mul(u64::from(retry)),
            BackoffKind::Exponential => self
                .base_ms
                .saturating_mul(2u64.saturating_pow(retry - 1)),
        };
        Duration::from_millis(ms.min(self.max_ms))
    }
}

/// Options that govern one `run_batch` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Upper bound on in-flight requests. `1` runs the batch sequentially.
    pub max_concurrency: usize,
    /// Per-call timeout for requests that do not set their own. `None`
    /// falls back to the seat's default timeout.
    pub timeout: Option<Duration>,
    /// Retries for requests that do not set their own.
    pub retries: u32,
    /// Wall-clock budget for the whole batch. Requests still pending when it
    /// elapses are reported as timed out.
    pub deadline: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: Seat::ALL.len(),
            timeout: None,
            retries: 2,
            deadline: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BatchOptions {
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Self::default()
        }
    }
}
