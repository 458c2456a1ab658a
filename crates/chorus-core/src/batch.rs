//! Bounded-concurrency batch dispatch.
//!
//! Runs N seat requests against a [`SeatBackend`] with at most
//! `max_concurrency` in flight, each through the retry wrapper, and returns
//! exactly one [`SeatResult`] per request in input order. A failing request
//! never affects its siblings.
//!
//! With `max_concurrency == 1` requests run one after another on the calling
//! task; otherwise they are spawned on a `JoinSet` gated by a semaphore.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chorus_types::batch::{BatchOptions, SeatRequest, SeatResult};
use chorus_types::error::DispatchError;
use chorus_types::metrics::ProcessingMetrics;
use chorus_types::seat::{Seat, SeatTable};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{BackendCall, SeatBackend};
use crate::clock::{Clock, TokioClock};
use crate::retry::{Deadline, dispatch_with_retry};

/// Results and metrics of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    /// Index-aligned with the input requests.
    pub results: Vec<SeatResult>,
    pub metrics: ProcessingMetrics,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// A request resolved against the seat table.
struct Prepared {
    index: usize,
    call: BackendCall,
    max_retries: u32,
}

/// Dispatches batches of seat requests.
pub struct BatchRunner<B, C = TokioClock> {
    backend: Arc<B>,
    clock: Arc<C>,
}

impl<B, C> Clone for BatchRunner<B, C> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<B: SeatBackend> BatchRunner<B, TokioClock> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_clock(backend, Arc::new(TokioClock))
    }
}

impl<B: SeatBackend, C: Clock> BatchRunner<B, C> {
    pub fn with_clock(backend: Arc<B>, clock: Arc<C>) -> Self {
        Self { backend, clock }
    }

    /// Run every request to a terminal outcome.
    pub async fn run(
        &self,
        table: &SeatTable,
        requests: Vec<SeatRequest>,
        options: &BatchOptions,
    ) -> BatchOutcome {
        let batch_id = Uuid::now_v7();
        let max_concurrency = if options.max_concurrency == 0 {
            tracing::warn!(%batch_id, "max_concurrency of 0 treated as 1");
            1
        } else {
            options.max_concurrency
        };

        let span = tracing::info_span!(
            "chorus.batch",
            %batch_id,
            requests = requests.len(),
            max_concurrency,
        );

        async move {
            let started = self.clock.now();
            let deadline = options.deadline.map(|d| Deadline::after(started, d));

            let seats: Vec<_> = requests.iter().map(|r| r.seat).collect();
            let mut slots: Vec<Option<SeatResult>> = vec![None; requests.len()];
            let mut runnable = Vec::with_capacity(requests.len());
            for (index, request) in requests.into_iter().enumerate() {
                match prepare(table, index, request, options) {
                    Ok(prepared) => runnable.push(prepared),
                    Err(result) => slots[index] = Some(result),
                }
            }

            if max_concurrency == 1 {
                for prepared in runnable {
                    let result = self.run_one(prepared, options, deadline).await;
                    let index = result.index;
                    slots[index] = Some(result);
                }
            } else {
                self.run_concurrent(runnable, options, deadline, max_concurrency, &mut slots)
                    .await;
            }

            let results: Vec<SeatResult> = slots
                .into_iter()
                .enumerate()
                .map(|(index, slot)| {
                    // Only reachable if a task vanished without reporting.
                    slot.unwrap_or_else(|| lost_result(index, seats[index], started, &*self.clock))
                })
                .collect();

            let batch_latency = self.clock.now().saturating_duration_since(started);
            let metrics = ProcessingMetrics::from_results(&results, batch_latency.as_millis() as u64);

            tracing::info!(
                succeeded = results.iter().filter(|r| r.is_success()).count(),
                failed = metrics.failed_seats.len(),
                retries = metrics.total_retries(),
                latency_ms = metrics.batch_latency_ms,
                "batch complete"
            );

            BatchOutcome {
                batch_id,
                results,
                metrics,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_one(
        &self,
        prepared: Prepared,
        options: &BatchOptions,
        deadline: Option<Deadline>,
    ) -> SeatResult {
        execute(
            &*self.backend,
            &*self.clock,
            prepared,
            options,
            deadline,
            &AtomicU32::new(0),
        )
        .await
    }

    async fn run_concurrent(
        &self,
        runnable: Vec<Prepared>,
        options: &BatchOptions,
        deadline: Option<Deadline>,
        max_concurrency: usize,
        slots: &mut [Option<SeatResult>],
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut set: JoinSet<SeatResult> = JoinSet::new();
        // task id -> (index, seat, attempts so far, dispatch start)
        let mut in_flight = HashMap::new();

        for prepared in runnable {
            let index = prepared.index;
            let seat = prepared.call.seat;
            let attempts = Arc::new(AtomicU32::new(0));

            let backend = Arc::clone(&self.backend);
            let clock = Arc::clone(&self.clock);
            let semaphore = Arc::clone(&semaphore);
            let task_attempts = Arc::clone(&attempts);
            let options = options.clone();

            let handle = set.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return SeatResult {
                            index,
                            seat,
                            outcome: Err(DispatchError::ManagerClosed),
                            attempts: 0,
                            latency: Duration::ZERO,
                        };
                    };
                    execute(&*backend, &*clock, prepared, &options, deadline, &task_attempts).await
                }
                .in_current_span(),
            );
            in_flight.insert(handle.id(), (index, seat, attempts, self.clock.now()));
        }

        let collect = async {
            while let Some(joined) = set.join_next_with_id().await {
                match joined {
                    Ok((id, result)) => {
                        in_flight.remove(&id);
                        let index = result.index;
                        slots[index] = Some(result);
                    }
                    Err(join_err) => {
                        let Some((index, seat, attempts, dispatched)) =
                            in_flight.remove(&join_err.id())
                        else {
                            continue;
                        };
                        tracing::error!(%seat, error = %join_err, "seat task did not complete");
                        slots[index] = Some(SeatResult {
                            index,
                            seat,
                            outcome: Err(DispatchError::Backend {
                                status: None,
                                message: format!("seat task failed: {join_err}"),
                            }),
                            attempts: attempts.load(Ordering::SeqCst),
                            latency: self.clock.now().saturating_duration_since(dispatched),
                        });
                    }
                }
            }
        };

        let timed_out = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if let (true, Some(deadline)) = (timed_out, deadline) {
            tracing::warn!(pending = set.len(), "batch deadline elapsed, aborting pending seats");
            set.shutdown().await;
            for (_, (index, seat, attempts, dispatched)) in in_flight.drain() {
                if slots[index].is_some() {
                    continue;
                }
                slots[index] = Some(SeatResult {
                    index,
                    seat,
                    outcome: Err(deadline.elapsed_error()),
                    attempts: attempts.load(Ordering::SeqCst),
                    latency: self.clock.now().saturating_duration_since(dispatched),
                });
            }
        }
    }
}

/// Resolve a request against the seat table. Requests that cannot be
/// resolved become failed results without ever reaching the backend.
fn prepare(
    table: &SeatTable,
    index: usize,
    request: SeatRequest,
    options: &BatchOptions,
) -> Result<Prepared, SeatResult> {
    let Some(definition) = table.get(request.seat) else {
        return Err(SeatResult {
            index,
            seat: request.seat,
            outcome: Err(DispatchError::InvalidRequest(format!(
                "seat '{}' is not defined",
                request.seat
            ))),
            attempts: 0,
            latency: Duration::ZERO,
        });
    };

    let timeout = request
        .timeout
        .or(options.timeout)
        .unwrap_or(definition.default_timeout);
    let host = table
        .host_for(request.seat, request.host.as_deref())
        .to_string();

    Ok(Prepared {
        index,
        max_retries: request.max_retries.unwrap_or(options.retries),
        call: BackendCall {
            seat: request.seat,
            model: definition.model.clone(),
            prompt: request.prompt,
            host,
            timeout,
        },
    })
}

async fn execute<B: SeatBackend, C: Clock>(
    backend: &B,
    clock: &C,
    prepared: Prepared,
    options: &BatchOptions,
    deadline: Option<Deadline>,
    attempts: &AtomicU32,
) -> SeatResult {
    let started = clock.now();
    let dispatched = dispatch_with_retry(
        backend,
        clock,
        &prepared.call,
        options.backoff,
        prepared.max_retries,
        deadline,
        attempts,
    )
    .await;

    let (outcome, attempts) = match dispatched {
        Ok(text) => (Ok(text), attempts.load(Ordering::SeqCst)),
        Err(failure) => (Err(failure.error), failure.attempts),
    };

    SeatResult {
        index: prepared.index,
        seat: prepared.call.seat,
        outcome,
        attempts,
        latency: clock.now().saturating_duration_since(started),
    }
}

fn lost_result<C: Clock>(index: usize, seat: Seat, started: Instant, clock: &C) -> SeatResult {
    SeatResult {
        index,
        seat,
        outcome: Err(DispatchError::Backend {
            status: None,
            message: "seat task produced no result".to_string(),
        }),
        attempts: 0,
        latency: clock.now().saturating_duration_since(started),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use chorus_types::batch::BackoffPolicy;
    use chorus_types::seat::SeatDefinition;

    /// Per-seat scripted backend that also tracks peak concurrency.
    struct SeatScript {
        delay: Duration,
        plan: Mutex<HashMap<Seat, Vec<Result<String, DispatchError>>>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SeatScript {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                plan: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn script(self, seat: Seat, outcomes: Vec<Result<String, DispatchError>>) -> Self {
            self.plan.lock().unwrap().insert(seat, outcomes);
            self
        }
    }

    impl SeatBackend for SeatScript {
        fn name(&self) -> &str {
            "seat-script"
        }

        async fn generate(&self, call: &BackendCall) -> Result<String, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let next = {
                let mut plan = self.plan.lock().unwrap();
                match plan.get_mut(&call.seat) {
                    Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                    _ => None,
                }
            };
            match next {
                Some(Err(DispatchError::Timeout { .. })) => {
                    // Simulate a hung backend.
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Some(outcome) => outcome,
                None => Ok(format!("{} answer", call.seat)),
            }
        }
    }

    /// Backend that panics for one seat.
    struct Panicky;

    impl SeatBackend for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn generate(&self, call: &BackendCall) -> Result<String, DispatchError> {
            if call.seat == Seat::Creative {
                panic!("backend bug");
            }
            Ok("fine".to_string())
        }
    }

    fn table() -> SeatTable {
        SeatTable::new(
            "http://127.0.0.1:11434".to_string(),
            Seat::Conversational,
            Seat::ALL.iter().map(|&seat| SeatDefinition {
                seat,
                model: format!("{seat}-model"),
                default_timeout: Duration::from_secs(30),
                host: None,
            }),
        )
    }

    fn options(max_concurrency: usize) -> BatchOptions {
        BatchOptions {
            max_concurrency,
            timeout: None,
            retries: 2,
            deadline: None,
            backoff: BackoffPolicy::none(),
        }
    }

    fn three_requests() -> Vec<SeatRequest> {
        Seat::ALL
            .iter()
            .map(|&seat| SeatRequest::new(seat, "How do I reverse a list?"))
            .collect()
    }

    fn network() -> DispatchError {
        DispatchError::Network {
            message: "connection reset".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_index_aligned() {
        let runner = BatchRunner::new(Arc::new(SeatScript::new(Duration::from_millis(10))));
        let requests = vec![
            SeatRequest::new(Seat::Conversational, "a"),
            SeatRequest::new(Seat::Coding, "b"),
            SeatRequest::new(Seat::Creative, "c"),
        ];

        let outcome = runner.run(&table(), requests, &options(3)).await;

        let seats: Vec<Seat> = outcome.results.iter().map(|r| r.seat).collect();
        assert_eq!(seats, vec![Seat::Conversational, Seat::Coding, Seat::Creative]);
        for (i, r) in outcome.results.iter().enumerate() {
            assert_eq!(r.index, i);
            assert!(r.is_success());
            assert_eq!(r.attempts, 1);
        }
        assert_eq!(outcome.metrics.per_seat.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_is_respected() {
        let backend = Arc::new(SeatScript::new(Duration::from_millis(100)));
        let runner = BatchRunner::new(Arc::clone(&backend));
        let requests: Vec<SeatRequest> = (0..6)
            .map(|i| SeatRequest::new(Seat::ALL[i % 3], format!("q{i}")))
            .collect();

        let outcome = runner.run(&table(), requests, &options(2)).await;

        assert_eq!(outcome.succeeded(), 6);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_mode_runs_one_at_a_time() {
        let backend = Arc::new(SeatScript::new(Duration::from_millis(100)));
        let runner = BatchRunner::new(Arc::clone(&backend));

        let start = Instant::now();
        let outcome = runner.run(&table(), three_requests(), &options(1)).await;

        assert_eq!(outcome.succeeded(), 3);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_is_clamped() {
        let backend = Arc::new(SeatScript::new(Duration::from_millis(10)));
        let runner = BatchRunner::new(Arc::clone(&backend));

        let outcome = runner.run(&table(), three_requests(), &options(0)).await;

        assert_eq!(outcome.succeeded(), 3);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_and_retries_counted() {
        let backend = SeatScript::new(Duration::from_millis(10))
            .script(Seat::Coding, vec![Err(network()), Ok("fixed".to_string())])
            .script(
                Seat::Creative,
                vec![Err(network()), Err(network()), Err(network())],
            );
        let runner = BatchRunner::new(Arc::new(backend));

        let outcome = runner.run(&table(), three_requests(), &options(3)).await;

        let coding = &outcome.results[0];
        assert_eq!(coding.content(), Some("fixed"));
        assert_eq!(coding.attempts, 2);

        let creative = &outcome.results[1];
        assert!(!creative.is_success());
        assert_eq!(creative.attempts, 3);
        assert_eq!(creative.error(), Some(&network()));

        let conversational = &outcome.results[2];
        assert!(conversational.is_success());

        assert_eq!(outcome.metrics.retry_counts(), vec![1, 2, 0]);
        assert_eq!(outcome.metrics.failed_seats, vec![Seat::Creative]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_and_concurrent_agree() {
        let script = || {
            SeatScript::new(Duration::from_millis(100))
                .script(Seat::Coding, vec![Err(network()), Err(network()), Err(network())])
        };

        let sequential_start = Instant::now();
        let sequential = BatchRunner::new(Arc::new(script()))
            .run(&table(), three_requests(), &options(1))
            .await;
        let sequential_elapsed = sequential_start.elapsed();

        let concurrent_start = Instant::now();
        let concurrent = BatchRunner::new(Arc::new(script()))
            .run(&table(), three_requests(), &options(3))
            .await;
        let concurrent_elapsed = concurrent_start.elapsed();

        let outcomes = |o: &BatchOutcome| -> Vec<bool> {
            o.results.iter().map(SeatResult::is_success).collect()
        };
        assert_eq!(outcomes(&sequential), vec![false, true, true]);
        assert_eq!(outcomes(&sequential), outcomes(&concurrent));
        assert_eq!(
            sequential.metrics.retry_counts(),
            concurrent.metrics.retry_counts()
        );
        assert!(concurrent_elapsed <= sequential_elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_request_overrides() {
        let backend = SeatScript::new(Duration::from_millis(10))
            .script(Seat::Coding, vec![Err(network()), Err(network())]);
        let runner = BatchRunner::new(Arc::new(backend));
        let requests = vec![SeatRequest::new(Seat::Coding, "q").with_max_retries(0)];

        let outcome = runner.run(&table(), requests, &options(3)).await;

        assert_eq!(outcome.results[0].attempts, 1);
        assert!(!outcome.results[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_seat_times_out_without_blocking_siblings() {
        let backend = SeatScript::new(Duration::from_millis(10)).script(
            Seat::Creative,
            vec![Err(DispatchError::Timeout {
                after: Duration::ZERO,
            })],
        );
        let runner = BatchRunner::new(Arc::new(backend));
        let requests = vec![
            SeatRequest::new(Seat::Coding, "q"),
            SeatRequest::new(Seat::Creative, "q").with_timeout(Duration::from_millis(500)),
            SeatRequest::new(Seat::Conversational, "q"),
        ];
        let mut opts = options(3);
        opts.retries = 0;

        let outcome = runner.run(&table(), requests, &opts).await;

        assert!(outcome.results[0].is_success());
        assert!(outcome.results[2].is_success());
        assert_eq!(
            outcome.results[1].error(),
            Some(&DispatchError::Timeout {
                after: Duration::from_millis(500)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_reports_pending_as_timeout() {
        let backend = SeatScript::new(Duration::from_millis(10)).script(
            Seat::Conversational,
            vec![Err(DispatchError::Timeout {
                after: Duration::ZERO,
            })],
        );
        let runner = BatchRunner::new(Arc::new(backend));
        let mut opts = options(3);
        opts.deadline = Some(Duration::from_secs(1));

        let start = Instant::now();
        let outcome = runner.run(&table(), three_requests(), &opts).await;

        assert!(start.elapsed() <= Duration::from_millis(1_100));
        assert!(outcome.results[0].is_success());
        assert!(outcome.results[1].is_success());
        let pending = &outcome.results[2];
        assert_eq!(
            pending.error(),
            Some(&DispatchError::Timeout {
                after: Duration::from_secs(1)
            })
        );
        assert_eq!(outcome.metrics.failed_seats, vec![Seat::Conversational]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_batch_honours_deadline() {
        let backend = SeatScript::new(Duration::from_millis(400));
        let runner = BatchRunner::new(Arc::new(backend));
        let mut opts = options(1);
        opts.deadline = Some(Duration::from_millis(600));

        let outcome = runner.run(&table(), three_requests(), &opts).await;

        let expired = DispatchError::Timeout {
            after: Duration::from_millis(600),
        };
        assert!(outcome.results[0].is_success());
        assert_eq!(outcome.results[1].error(), Some(&expired));
        assert_eq!(outcome.results[1].attempts, 1);
        assert_eq!(outcome.results[2].error(), Some(&expired));
        assert_eq!(outcome.results[2].attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_error_same_in_both_modes() {
        let hung = || {
            SeatScript::new(Duration::from_millis(10)).script(
                Seat::Creative,
                vec![Err(DispatchError::Timeout {
                    after: Duration::ZERO,
                })],
            )
        };
        let mut sequential = options(1);
        sequential.deadline = Some(Duration::from_millis(750));
        let concurrent = BatchOptions {
            max_concurrency: 3,
            ..sequential.clone()
        };

        let seq = BatchRunner::new(Arc::new(hung()))
            .run(&table(), three_requests(), &sequential)
            .await;
        let con = BatchRunner::new(Arc::new(hung()))
            .run(&table(), three_requests(), &concurrent)
            .await;

        let expired = DispatchError::Timeout {
            after: Duration::from_millis(750),
        };
        assert_eq!(seq.results[1].error(), Some(&expired));
        assert_eq!(con.results[1].error(), Some(&expired));
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_failed_result() {
        let runner = BatchRunner::new(Arc::new(Panicky));

        let outcome = runner.run(&table(), three_requests(), &options(3)).await;

        assert!(outcome.results[0].is_success());
        assert!(outcome.results[2].is_success());
        let failed = &outcome.results[1];
        assert_eq!(failed.seat, Seat::Creative);
        assert!(matches!(
            failed.error(),
            Some(DispatchError::Backend { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = BatchRunner::new(Arc::new(Panicky));
        let outcome = runner.run(&table(), Vec::new(), &options(3)).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.metrics.per_seat.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_fails_without_dispatch() {
        let backend = Arc::new(SeatScript::new(Duration::ZERO));
        let runner = BatchRunner::new(Arc::clone(&backend));
        let requests = vec![SeatRequest::new(Seat::Coding, "")];

        let outcome = runner.run(&table(), requests, &options(3)).await;

        assert!(matches!(
            outcome.results[0].error(),
            Some(DispatchError::InvalidRequest(_))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
