//! Inspect a capture file: row counts, type breakdown, time range.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sqlcap::storage::{StoreSummary, summarize};

#[derive(Parser)]
#[command(name = "sqlcap-dump", about = "Inspect sqlcap capture files")]
struct Cli {
    /// Path to a capture file (SQLite)
    path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let summary = summarize(&cli.path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", cli.path.display());
        process::exit(1);
    });

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error encoding summary: {e}");
                process::exit(1);
            }
        }
    } else {
        print_summary(&cli, &summary);
    }
}

fn print_summary(cli: &Cli, summary: &StoreSummary) {
    let fname = cli.path.file_name().unwrap_or_default().to_string_lossy();
    let format = summary
        .file_properties
        .get("FormatVersion")
        .map(String::as_str)
        .unwrap_or("unknown");
    println!("File: {fname}");
    println!("Format version: {format}");

    println!(
        "\nEvents: {} rows, {} sessions, max row id {}",
        summary.event_rows, summary.session_count, summary.max_row_id
    );
    if let (Some(first), Some(last)) = (&summary.first_start_time, &summary.last_start_time) {
        println!("  Time range: {first} \u{2013} {last}");
    }
    for (name, rows) in &summary.events_by_type {
        println!("  {name:<20} {rows:>10}");
    }

    println!("\nWait rows:    {}", summary.wait_rows);
    println!("Counter rows: {}", summary.counter_rows);
}
