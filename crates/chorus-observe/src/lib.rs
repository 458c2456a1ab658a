//! Observability setup for Chorus: structured logging via `tracing`, with
//! optional OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingConfig, init_tracing, shutdown_tracing};
