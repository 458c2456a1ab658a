//! Chorus CLI entry point.
//!
//! Binary name: `chorus`
//!
//! Parses CLI arguments, initializes tracing and the orchestrator, then
//! dispatches to the command handler. Ctrl-C shuts the HTTP resources down,
//! which cancels in-flight seat calls.

mod cli;
mod state;

use clap::Parser;

use chorus_observe::{LogFormat, TracingConfig, init_tracing, shutdown_tracing};

use cli::{Cli, Commands, SeatsAction};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_config = TracingConfig {
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        otel: cli.otel,
        span_timing: cli.verbose >= 2,
        ..TracingConfig::new(cli::log_filter(cli.verbose, cli.quiet))
    };
    init_tracing(&tracing_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init(cli.config.as_deref());

    let resources = std::sync::Arc::clone(&state.resources);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight seat calls");
            resources.shutdown();
        }
    });

    let result = match cli.command {
        Commands::Ask {
            message,
            context,
            dispatch,
        } => cli::ask::ask(&state, &message, context, &dispatch, cli.json, cli.quiet).await,

        Commands::Batch {
            message,
            seats,
            dispatch,
        } => cli::batch::batch(&state, &message, seats, &dispatch, cli.json).await,

        Commands::Seats { action } => match action {
            SeatsAction::List => cli::seats::list_seats(&state, cli.json).await,
            SeatsAction::Init { force } => {
                cli::seats::init_seats(&state.seats_path, force, cli.json).await
            }
        },
    };

    state.shutdown();
    shutdown_tracing();
    result
}
