//! `chorus seats`: inspect and create the seat config.

use std::path::Path;

use anyhow::Result;
use console::style;

use chorus_core::seat_table::LoadedSeats;
use chorus_infra::config::write_default_seats;

use crate::state::AppState;

/// Show the configured seats and batch defaults.
pub async fn list_seats(state: &AppState, json: bool) -> Result<()> {
    let loaded = state.orchestrator.seats().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&seats_json(&loaded, &state.seats_path))?
        );
        return Ok(());
    }

    let table = &loaded.table;
    let defaults = &loaded.batch_defaults;

    println!();
    println!(
        "  {} {}",
        style("Seats").bold(),
        style(state.seats_path.display()).dim()
    );
    println!();
    for def in table.iter() {
        let marker = if def.seat == table.synthesis_seat() {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {marker} {:<15} {:<20} {:<28} {}ms",
            style(def.seat.as_str()).cyan(),
            def.model,
            table.host_for(def.seat, None),
            def.default_timeout.as_millis()
        );
    }
    println!();
    println!(
        "  {}",
        style(format!(
            "max_concurrency={} retries={} deadline={}",
            defaults.max_concurrency,
            defaults.retries,
            defaults
                .deadline
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "none".to_string())
        ))
        .dim()
    );
    println!("  {}", style("* synthesis seat").dim());
    println!();
    Ok(())
}

/// Write the default seat config file.
pub async fn init_seats(path: &Path, force: bool, json: bool) -> Result<()> {
    let written = write_default_seats(path, force).await?;

    if json {
        let out = serde_json::json!({
            "path": path.display().to_string(),
            "written": written,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if written {
        println!(
            "  {} Wrote {}",
            style("✓").green().bold(),
            style(path.display()).cyan()
        );
    } else {
        println!(
            "  {} {} already exists (use --force to overwrite)",
            style("!").yellow().bold(),
            path.display()
        );
    }
    Ok(())
}

fn seats_json(loaded: &LoadedSeats, path: &Path) -> serde_json::Value {
    let table = &loaded.table;
    let defaults = &loaded.batch_defaults;
    let seats: Vec<serde_json::Value> = table
        .iter()
        .map(|def| {
            serde_json::json!({
                "seat": def.seat,
                "model": def.model,
                "host": table.host_for(def.seat, None),
                "timeout_ms": def.default_timeout.as_millis() as u64,
            })
        })
        .collect();

    serde_json::json!({
        "path": path.display().to_string(),
        "default_host": table.default_host(),
        "synthesis_seat": table.synthesis_seat(),
        "seats": seats,
        "batch": {
            "max_concurrency": defaults.max_concurrency,
            "retries": defaults.retries,
            "timeout_ms": defaults.timeout.map(|d| d.as_millis() as u64),
            "deadline_ms": defaults.deadline.map(|d| d.as_millis() as u64),
            "backoff": defaults.backoff,
        },
    })
}
