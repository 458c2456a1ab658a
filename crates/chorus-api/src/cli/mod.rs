//! CLI command definitions for the `chorus` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod ask;
pub mod batch;
pub mod seats;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use chorus_types::batch::BatchOptions;

/// Ask a panel of local models and get one merged answer.
#[derive(Parser)]
#[command(name = "chorus", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Seat config file (default: $CHORUS_SEATS, then ~/.chorus/seats.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask every seat, then synthesize one answer.
    Ask {
        /// The message to answer.
        message: String,

        /// Identity context as JSON (default: read from stdin when piped).
        #[arg(long, value_name = "JSON")]
        context: Option<String>,

        #[command(flatten)]
        dispatch: DispatchArgs,
    },

    /// Send one prompt to selected seats and show every answer, unmerged.
    Batch {
        /// The prompt to send.
        message: String,

        /// Seat to include (repeatable; default: all seats).
        #[arg(long = "seat", value_name = "SEAT")]
        seats: Vec<chorus_types::seat::Seat>,

        #[command(flatten)]
        dispatch: DispatchArgs,
    },

    /// Inspect or create the seat config.
    Seats {
        #[command(subcommand)]
        action: SeatsAction,
    },
}

#[derive(Subcommand)]
pub enum SeatsAction {
    /// Show the configured seats and batch defaults.
    #[command(alias = "ls")]
    List,

    /// Write the default seat config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Per-invocation overrides for the configured batch defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct DispatchArgs {
    /// Maximum seat calls in flight (1 = sequential).
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Retries per seat call after the first attempt.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Per-call timeout in milliseconds.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Wall-clock budget for the whole batch in milliseconds.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub deadline_ms: Option<u64>,
}

impl DispatchArgs {
    /// Layer these overrides on top of `base`.
    pub fn apply(&self, base: BatchOptions) -> BatchOptions {
        BatchOptions {
            max_concurrency: self.concurrency.unwrap_or(base.max_concurrency),
            retries: self.retries.unwrap_or(base.retries),
            timeout: self.timeout_ms.map(Duration::from_millis).or(base.timeout),
            deadline: self.deadline_ms.map(Duration::from_millis).or(base.deadline),
            backoff: base.backoff,
        }
    }
}

/// Map `-v` / `--quiet` to a default filter directive.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug,hyper_util=info,reqwest=info",
        _ => "trace",
    }
}
