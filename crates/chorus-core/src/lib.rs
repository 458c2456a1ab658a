//! Core orchestration logic for Chorus.
//!
//! Defines the backend and config-source seams, the per-call retry wrapper,
//! bounded-concurrency batch dispatch, synthesis prompt construction, and the
//! [`orchestrator::Orchestrator`] facade tying them together. Depends only on
//! chorus-types plus tokio; infrastructure lives in chorus-infra.

pub mod backend;
pub mod batch;
pub mod clock;
pub mod orchestrator;
pub mod retry;
pub mod seat_table;
pub mod synthesis;
