//! SalesForge: sales dashboard with RFM customer segmentation
//!
//! This is the main entrypoint that orchestrates table loading, the date
//! filter, report computation, and output.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use salesforge::{build_report, print_report, render_report, Args, Tables};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let start_time = Instant::now();

    let tables = Tables::load(&args.data_dir)
        .with_context(|| format!("loading tables from {}", args.data_dir.display()))?;
    let range = args.date_range(tables.purchase_span()?)?;

    let report = build_report(&tables, &range)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if let Some(output_dir) = &args.output {
        let written = render_report(&report, output_dir)?;
        if !args.json {
            println!("\n✓ {} charts saved to {}", written.len(), output_dir.display());
        }
    }

    info!(elapsed_ms = start_time.elapsed().as_millis() as u64, "dashboard complete");
    Ok(())
}

/// Log to stderr so JSON output on stdout stays clean; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
