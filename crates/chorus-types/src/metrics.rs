//! Observability data attached to every processed message.

use serde::{Deserialize, Serialize};

use crate::batch::SeatResult;
use crate::seat::Seat;

/// Per-request measurements from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMetric {
    pub index: usize,
    pub seat: Seat,
    pub latency_ms: u64,
    /// Attempts beyond the first.
    pub retries: u32,
    pub succeeded: bool,
    /// Error kind for failed requests (e.g. "timeout").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl SeatMetric {
    pub fn from_result(result: &SeatResult) -> Self {
        Self {
            index: result.index,
            seat: result.seat,
            latency_ms: result.latency.as_millis() as u64,
            retries: result.attempts.saturating_sub(1),
            succeeded: result.is_success(),
            error_kind: result.error().map(|e| e.kind().to_string()),
        }
    }
}

/// Latency, retry and failure summary of a batch (and its synthesis).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Index-aligned with the batch input.
    pub per_seat: Vec<SeatMetric>,
    pub batch_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_latency_ms: Option<u64>,
    pub total_latency_ms: u64,
    pub failed_seats: Vec<Seat>,
}

impl ProcessingMetrics {
    /// Build batch metrics from index-ordered results.
    pub fn from_results(results: &[SeatResult], batch_latency_ms: u64) -> Self {
        let per_seat: Vec<SeatMetric> = results.iter().map(SeatMetric::from_result).collect();
        let failed_seats = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.seat)
            .collect();
        Self {
            per_seat,
            batch_latency_ms,
            synthesis_latency_ms: None,
            total_latency_ms: batch_latency_ms,
            failed_seats,
        }
    }

    /// Retry counts, index-aligned with the batch input.
    pub fn retry_counts(&self) -> Vec<u32> {
        self.per_seat.iter().map(|m| m.retries).collect()
    }

    pub fn total_retries(&self) -> u32 {
        self.per_seat.iter().map(|m| m.retries).sum()
    }
}

/// What the caller receives for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub response: String,
    pub metrics: ProcessingMetrics,
}
