//! Injectable time source for the retry wrapper and batch runner.

use std::time::Duration;

use tokio::time::Instant;

/// Time source used for backoff sleeps and deadline arithmetic.
///
/// Production code uses [`TokioClock`]; tests substitute a clock that
/// records sleeps instead of waiting.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Clock backed by the tokio timer (honours `tokio::time::pause`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
