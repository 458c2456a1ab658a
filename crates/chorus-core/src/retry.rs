//! Per-call retry wrapper.
//!
//! A single seat call moves through `Attempt(1) .. Attempt(max_retries + 1)`.
//! Each attempt ends in success, a retryable failure (wait, then try again),
//! or a fatal failure. [`RetryMachine`] holds the pure transition logic so it
//! can be tested without timers; [`dispatch_with_retry`] drives it against a
//! real backend and clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chorus_types::batch::BackoffPolicy;
use chorus_types::error::{DispatchError, SeatFailure};
use tokio::time::Instant;
use tracing::Instrument;

use crate::backend::{BackendCall, SeatBackend};
use crate::clock::Clock;

// ---------------------------------------------------------------------------
// RetryMachine
// ---------------------------------------------------------------------------

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make the next attempt.
    Retry { delay: Duration },
    /// The error is not worth retrying.
    Fatal,
    /// Attempts or deadline used up.
    Exhausted,
}

/// Attempt bookkeeping for one seat call.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    backoff: BackoffPolicy,
    max_retries: u32,
    attempt: u32,
}

impl RetryMachine {
    pub fn new(backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            backoff,
            max_retries,
            attempt: 0,
        }
    }

    /// Enter the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide the transition after the current attempt failed with `error`.
    ///
    /// `remaining` is the time left before the batch deadline, if any. A retry
    /// whose backoff alone would reach the deadline is not started.
    pub fn on_failure(&self, error: &DispatchError, remaining: Option<Duration>) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Fatal;
        }
        if self.attempt >= self.max_attempts() {
            return RetryDecision::Exhausted;
        }
        let delay = self.backoff.delay_for(self.attempt);
        match remaining {
            Some(left) if delay >= left => RetryDecision::Exhausted,
            _ => RetryDecision::Retry { delay },
        }
    }
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Absolute batch deadline and the budget it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub budget: Duration,
}

impl Deadline {
    pub fn after(start: Instant, budget: Duration) -> Self {
        Self {
            at: start + budget,
            budget,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.at.saturating_duration_since(now)
    }

    /// Error reported for any call cut short by this deadline.
    pub fn elapsed_error(&self) -> DispatchError {
        DispatchError::Timeout { after: self.budget }
    }
}

// ---------------------------------------------------------------------------
// dispatch_with_retry
// ---------------------------------------------------------------------------

/// Run one call to a terminal outcome.
///
/// Every attempt is bounded by `call.timeout`, further clipped to the batch
/// `deadline`. An attempt cut short by the deadline reports the deadline's
/// budget rather than its own. `attempts` is updated as attempts start, so a
/// caller that abandons this future still knows how many were made.
pub async fn dispatch_with_retry<B, C>(
    backend: &B,
    clock: &C,
    call: &BackendCall,
    backoff: BackoffPolicy,
    max_retries: u32,
    deadline: Option<Deadline>,
    attempts: &AtomicU32,
) -> Result<String, SeatFailure>
where
    B: SeatBackend,
    C: Clock,
{
    if let Err(error) = call.validate() {
        tracing::warn!(seat = %call.seat, %error, "rejecting seat call");
        return Err(SeatFailure { error, attempts: 0 });
    }

    let mut machine = RetryMachine::new(backoff, max_retries);

    loop {
        let remaining = deadline.map(|d| d.remaining(clock.now()));
        if let (Some(deadline), Some(left)) = (deadline, remaining) {
            if left.is_zero() {
                return Err(SeatFailure {
                    error: deadline.elapsed_error(),
                    attempts: machine.attempts(),
                });
            }
        }

        let attempt = machine.begin_attempt();
        attempts.store(attempt, Ordering::SeqCst);

        let clipped = remaining.is_some_and(|left| left < call.timeout);
        let budget = match remaining {
            Some(left) => call.timeout.min(left),
            None => call.timeout,
        };

        let span = tracing::info_span!(
            "chorus.seat_call",
            seat = %call.seat,
            model = call.model.as_str(),
            backend = backend.name(),
            attempt,
            latency_ms = tracing::field::Empty,
        );
        let started = clock.now();

        let outcome = async {
            match tokio::time::timeout(budget, backend.generate(call)).await {
                Ok(result) => result,
                Err(_) => Err(match deadline {
                    Some(deadline) if clipped => deadline.elapsed_error(),
                    _ => DispatchError::Timeout { after: budget },
                }),
            }
        }
        .instrument(span.clone())
        .await;

        let elapsed = clock.now().saturating_duration_since(started);
        span.record("latency_ms", elapsed.as_millis() as u64);

        let error = match outcome {
            Ok(text) => {
                tracing::debug!(
                    parent: &span,
                    chars = text.len(),
                    "seat call succeeded"
                );
                return Ok(text);
            }
            Err(error) => error,
        };

        let remaining = deadline.map(|d| d.remaining(clock.now()));
        match machine.on_failure(&error, remaining) {
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    parent: &span,
                    %error,
                    delay_ms = delay.as_millis() as u64,
                    "seat call failed, retrying"
                );
                clock.sleep(delay).await;
            }
            RetryDecision::Fatal | RetryDecision::Exhausted => {
                tracing::warn!(parent: &span, %error, "seat call failed");
                return Err(SeatFailure {
                    error,
                    attempts: machine.attempts(),
                });
            }
        }
    }
}
