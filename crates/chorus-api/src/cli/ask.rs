//! `chorus ask`: full fan-out and synthesis for one message.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use console::style;
use tokio::io::AsyncReadExt;

use chorus_core::orchestrator::OrchestratorError;
use chorus_core::synthesis::best_available;
use chorus_types::identity::IdentityContext;
use chorus_types::metrics::ProcessingMetrics;
use chorus_types::seat::Seat;

use super::DispatchArgs;
use crate::state::AppState;

/// Answer one message. When synthesis fails but some seat answered, the best
/// seat answer is returned with a warning instead of failing.
pub async fn ask(
    state: &AppState,
    message: &str,
    context: Option<String>,
    dispatch: &DispatchArgs,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let context = load_context(context).await?;
    let options = dispatch.apply(state.orchestrator.default_options().await?);

    let (response, metrics, fallback) = match state
        .orchestrator
        .process_message(message, context.prefix(), Some(&options))
        .await
    {
        Ok(processed) => (processed.response, processed.metrics, None),
        Err(OrchestratorError::Synthesis {
            error,
            batch: Some(batch),
        }) => {
            let Some(best) = best_available(&batch.results) else {
                return Err(anyhow::Error::new(error).context("no seat produced an answer"));
            };
            tracing::warn!(%error, fallback = %best.seat, "synthesis failed, using single seat answer");
            let seat = best.seat;
            let text = best.content().unwrap_or_default().to_string();
            (text, batch.metrics, Some((seat, error.to_string())))
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        let out = serde_json::json!({
            "response": response,
            "fallback_seat": fallback.as_ref().map(|(seat, _)| seat.as_str()),
            "warning": fallback.as_ref().map(|(_, warning)| warning),
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{response}");

    if !quiet {
        if let Some((seat, warning)) = &fallback {
            eprintln!(
                "{} synthesis failed ({warning}); showing the {} answer",
                style("!").yellow().bold(),
                seat.label().to_lowercase()
            );
        }
        eprintln!("{}", style(summary_line(&metrics)).dim());
    }

    Ok(())
}

/// Identity context from `--context`, else from piped stdin, else empty.
async fn load_context(inline: Option<String>) -> Result<IdentityContext> {
    let raw = match inline {
        Some(raw) => raw,
        None if !std::io::stdin().is_terminal() => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read context from stdin")?;
            buf
        }
        None => String::new(),
    };
    parse_context(&raw)
}

fn parse_context(raw: &str) -> Result<IdentityContext> {
    IdentityContext::from_json(raw).context("invalid JSON context")
}

/// One-line run summary, e.g. `3/3 seats answered, 1 retry, 2.31s`.
fn summary_line(metrics: &ProcessingMetrics) -> String {
    let total = metrics.per_seat.len();
    let answered = metrics.per_seat.iter().filter(|m| m.succeeded).count();
    let retries = metrics.total_retries();

    let mut line = format!(
        "{answered}/{total} seats answered, {retries} {}, {:.2}s",
        if retries == 1 { "retry" } else { "retries" },
        metrics.total_latency_ms as f64 / 1000.0
    );
    if !metrics.failed_seats.is_empty() {
        let failed: Vec<&str> = metrics.failed_seats.iter().map(Seat::as_str).collect();
        line.push_str(&format!(" (failed: {})", failed.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    use chorus_types::metrics::SeatMetric;

    fn metric(index: usize, seat: Seat, retries: u32, succeeded: bool) -> SeatMetric {
        SeatMetric {
            index,
            seat,
            latency_ms: 100,
            retries,
            succeeded,
            error_kind: (!succeeded).then(|| "timeout".to_string()),
        }
    }

    #[test]
    fn test_parse_context_shapes() {
        assert_eq!(parse_context("").unwrap().prefix(), "");
        assert_eq!(
            parse_context(r#"{"identity": {"prompt": "be brief"}}"#)
                .unwrap()
                .prefix(),
            "be brief"
        );
    }

    #[test]
    fn test_parse_context_invalid_json() {
        let err = parse_context("{oops").unwrap_err();
        assert!(err.to_string().contains("invalid JSON context"));
    }

    #[test]
    fn test_summary_line_all_ok() {
        let metrics = ProcessingMetrics {
            per_seat: vec![
                metric(0, Seat::Coding, 0, true),
                metric(1, Seat::Creative, 1, true),
                metric(2, Seat::Conversational, 0, true),
            ],
            total_latency_ms: 2_310,
            ..ProcessingMetrics::default()
        };
        assert_eq!(summary_line(&metrics), "3/3 seats answered, 1 retry, 2.31s");
    }

    #[test]
    fn test_summary_line_lists_failures() {
        let metrics = ProcessingMetrics {
            per_seat: vec![
                metric(0, Seat::Coding, 2, false),
                metric(1, Seat::Creative, 0, true),
            ],
            failed_seats: vec![Seat::Coding],
            total_latency_ms: 500,
            ..ProcessingMetrics::default()
        };
        assert_eq!(
            summary_line(&metrics),
            "1/2 seats answered, 2 retries, 0.50s (failed: coding)"
        );
    }
}
