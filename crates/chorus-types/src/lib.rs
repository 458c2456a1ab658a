//! Shared domain types for Chorus.
//!
//! Seats and their definitions, batch requests and results, processing
//! metrics, identity context, the seat config schema, and the error
//! taxonomy used across the orchestrator.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod batch;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod seat;
