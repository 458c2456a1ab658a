//! `chorus batch`: raw seat answers without synthesis.

use anyhow::{Result, bail};
use console::style;

use chorus_core::batch::BatchOutcome;
use chorus_types::batch::{SeatRequest, SeatResult};
use chorus_types::seat::Seat;

use super::DispatchArgs;
use crate::state::AppState;

/// Send `message` to each selected seat (all seats when none are given) and
/// print every outcome. Fails only when no seat answered.
pub async fn batch(
    state: &AppState,
    message: &str,
    seats: Vec<Seat>,
    dispatch: &DispatchArgs,
    json: bool,
) -> Result<()> {
    let seats = if seats.is_empty() {
        Seat::ALL.to_vec()
    } else {
        seats
    };
    let options = dispatch.apply(state.orchestrator.default_options().await?);
    let requests = seats
        .iter()
        .map(|&seat| SeatRequest::new(seat, message))
        .collect();

    let outcome = state.orchestrator.run_batch(requests, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        for result in &outcome.results {
            print_result(result);
        }
        println!(
            "  {}",
            style(format!(
                "{}/{} answered in {}ms (batch {})",
                outcome.succeeded(),
                outcome.results.len(),
                outcome.metrics.batch_latency_ms,
                outcome.batch_id
            ))
            .dim()
        );
    }

    if outcome.succeeded() == 0 && !outcome.results.is_empty() {
        bail!("no seat produced an answer");
    }
    Ok(())
}

fn print_result(result: &SeatResult) {
    println!();
    println!(
        "  {} {}",
        style(result.seat.label()).cyan().bold(),
        style(format!(
            "({} attempt{}, {}ms)",
            result.attempts,
            if result.attempts == 1 { "" } else { "s" },
            result.latency.as_millis()
        ))
        .dim()
    );
    match &result.outcome {
        Ok(text) => println!("{text}"),
        Err(error) => println!("  {} {error}", style("✗").red()),
    }
    println!();
}

fn outcome_json(outcome: &BatchOutcome) -> serde_json::Value {
    let results: Vec<serde_json::Value> = outcome
        .results
        .iter()
        .map(|r| match &r.outcome {
            Ok(text) => serde_json::json!({
                "index": r.index,
                "seat": r.seat,
                "ok": true,
                "content": text,
                "attempts": r.attempts,
                "latency_ms": r.latency.as_millis() as u64,
            }),
            Err(error) => serde_json::json!({
                "index": r.index,
                "seat": r.seat,
                "ok": false,
                "error": error.to_string(),
                "error_kind": error.kind(),
                "attempts": r.attempts,
                "latency_ms": r.latency.as_millis() as u64,
            }),
        })
        .collect();

    serde_json::json!({
        "batch_id": outcome.batch_id.to_string(),
        "results": results,
        "metrics": outcome.metrics,
    })
}
