//! Orchestrator: the public facade over batch dispatch and synthesis.
//!
//! `process_message` fans a message out to every seat with the identity
//! prefix applied, then asks the synthesis seat to merge the answers. Seat
//! failures degrade the synthesis prompt (placeholders) but never abort it;
//! only a failed synthesis call or a bad seat config is an error.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use chorus_types::batch::{BatchOptions, SeatRequest, SeatResult};
use chorus_types::error::{ConfigError, DispatchError, SeatFailure, SynthesisError};
use chorus_types::metrics::ProcessedMessage;
use chorus_types::seat::Seat;
use thiserror::Error;
use tracing::Instrument;

use crate::backend::{BackendCall, SeatBackend};
use crate::batch::{BatchOutcome, BatchRunner};
use crate::clock::{Clock, TokioClock};
use crate::retry::dispatch_with_retry;
use crate::seat_table::{LoadedSeats, SeatConfigSource, SeatTableCache};
use crate::synthesis::{build_synthesis_prompt, condition_prompt};

/// Errors from the orchestrator facade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("message is empty")]
    EmptyMessage,

    /// Synthesis failed. When the batch ran inside the orchestrator its
    /// outcome is kept so callers can fall back to a single seat answer.
    #[error("{error}")]
    Synthesis {
        #[source]
        error: SynthesisError,
        batch: Option<Box<BatchOutcome>>,
    },
}

pub struct Orchestrator<B, S, C = TokioClock> {
    backend: Arc<B>,
    clock: Arc<C>,
    runner: BatchRunner<B, C>,
    seats: SeatTableCache<S>,
}

impl<B: SeatBackend, S: SeatConfigSource> Orchestrator<B, S, TokioClock> {
    pub fn new(backend: Arc<B>, source: S) -> Self {
        Self::with_clock(backend, source, Arc::new(TokioClock))
    }
}

impl<B: SeatBackend, S: SeatConfigSource, C: Clock> Orchestrator<B, S, C> {
    pub fn with_clock(backend: Arc<B>, source: S, clock: Arc<C>) -> Self {
        Self {
            runner: BatchRunner::with_clock(Arc::clone(&backend), Arc::clone(&clock)),
            backend,
            clock,
            seats: SeatTableCache::new(source),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The validated seat table, loaded on first use.
    pub async fn seats(&self) -> Result<Arc<LoadedSeats>, ConfigError> {
        self.seats.get().await
    }

    /// Batch options from the seat config document.
    pub async fn default_options(&self) -> Result<BatchOptions, ConfigError> {
        Ok(self.seats.get().await?.batch_defaults.clone())
    }

    /// Dispatch a batch of seat requests. Per-request failures are reported
    /// in the results; only a seat config problem is an error.
    pub async fn run_batch(
        &self,
        requests: Vec<SeatRequest>,
        options: &BatchOptions,
    ) -> Result<BatchOutcome, ConfigError> {
        let loaded = self.seats.get().await?;
        Ok(self.runner.run(&loaded.table, requests, options).await)
    }

    /// Merge seat results into one answer via the synthesis seat, using the
    /// batch defaults from the seat config.
    pub async fn synthesize(
        &self,
        results: &[SeatResult],
        identity_prefix: &str,
    ) -> Result<String, OrchestratorError> {
        let loaded = self.seats.get().await?;
        self.synthesize_with(&loaded, results, identity_prefix, None, &loaded.batch_defaults)
            .await
            .map_err(|error| OrchestratorError::Synthesis { error, batch: None })
    }

    /// Full pipeline: fan out to every seat, then synthesize.
    ///
    /// `options` overrides the configured batch defaults.
    pub async fn process_message(
        &self,
        message: &str,
        identity_prefix: &str,
        options: Option<&BatchOptions>,
    ) -> Result<ProcessedMessage, OrchestratorError> {
        if message.trim().is_empty() {
            return Err(OrchestratorError::EmptyMessage);
        }

        let loaded = self.seats.get().await?;
        let options = options.unwrap_or(&loaded.batch_defaults).clone();
        let span = tracing::info_span!("chorus.process_message", chars = message.len());

        async move {
            let started = self.clock.now();
            let prompt = condition_prompt(identity_prefix, message);
            let requests = Seat::ALL
                .iter()
                .map(|&seat| SeatRequest::new(seat, prompt.clone()))
                .collect();

            let mut batch = self.runner.run(&loaded.table, requests, &options).await;

            let synthesis_started = self.clock.now();
            let synthesized = self
                .synthesize_with(
                    &loaded,
                    &batch.results,
                    identity_prefix,
                    Some(message),
                    &options,
                )
                .await;
            let now = self.clock.now();

            batch.metrics.synthesis_latency_ms =
                Some(now.saturating_duration_since(synthesis_started).as_millis() as u64);
            batch.metrics.total_latency_ms =
                now.saturating_duration_since(started).as_millis() as u64;

            match synthesized {
                Ok(response) => {
                    tracing::info!(
                        total_ms = batch.metrics.total_latency_ms,
                        failed_seats = batch.metrics.failed_seats.len(),
                        "message processed"
                    );
                    Ok(ProcessedMessage {
                        response,
                        metrics: batch.metrics,
                    })
                }
                Err(error) => Err(OrchestratorError::Synthesis {
                    error,
                    batch: Some(Box::new(batch)),
                }),
            }
        }
        .instrument(span)
        .await
    }

    async fn synthesize_with(
        &self,
        loaded: &LoadedSeats,
        results: &[SeatResult],
        identity_prefix: &str,
        user_message: Option<&str>,
        options: &BatchOptions,
    ) -> Result<String, SynthesisError> {
        let seat = loaded.table.synthesis_seat();
        let Some(definition) = loaded.table.get(seat) else {
            return Err(SynthesisError {
                seat,
                failure: SeatFailure {
                    error: DispatchError::InvalidRequest(format!("seat '{seat}' is not defined")),
                    attempts: 0,
                },
            });
        };

        let call = BackendCall {
            seat,
            model: definition.model.clone(),
            prompt: build_synthesis_prompt(results, identity_prefix, user_message),
            host: loaded.table.host_for(seat, None).to_string(),
            timeout: options.timeout.unwrap_or(definition.default_timeout),
        };

        tracing::debug!(%seat, model = call.model.as_str(), "synthesizing");

        dispatch_with_retry(
            &*self.backend,
            &*self.clock,
            &call,
            options.backoff,
            options.retries,
            None,
            &AtomicU32::new(0),
        )
        .await
        .map_err(|failure| SynthesisError { seat, failure })
    }
}
