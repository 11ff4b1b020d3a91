//! relay-run - Executes a ladder program from a JSON document
//!
//! Loads a program document, steps the driver a fixed number of scans
//! at a fixed scan time, logs watched tags as they change, and prints a
//! final state table.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_engine::{Driver, Dt, RewindPolicy};
use relay_model::ProgramDoc;

#[derive(Parser, Debug)]
#[command(name = "relay-run")]
#[command(about = "Run a ladder program for a fixed number of scans")]
struct Cli {
    /// Path to a program document (JSON)
    program: PathBuf,

    /// Number of scans to run
    #[arg(long, default_value = "100")]
    scans: u64,

    /// Scan time in milliseconds
    #[arg(long, default_value = "10")]
    dt_ms: u64,

    /// Tag names to watch for changes (repeatable)
    #[arg(long = "watch")]
    watches: Vec<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading program from: {}", cli.program.display());

    let text = match std::fs::read_to_string(&cli.program) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read {}: {}", cli.program.display(), e);
            std::process::exit(1);
        }
    };

    let doc = match ProgramDoc::from_json(&text) {
        Ok(doc) => doc,
        Err(e) => {
            error!("Malformed program document: {}", e);
            std::process::exit(1);
        }
    };

    let program = match doc.build() {
        Ok(program) => program,
        Err(e) => {
            error!("Program failed to build: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        tags = program.tags().len(),
        rungs = program.rungs().len(),
        "program built"
    );

    let mut driver = Driver::new(program, RewindPolicy::Truncate);

    let mut watched = Vec::new();
    for name in &cli.watches {
        let Some(tag) = driver.program().tags().resolve(name) else {
            error!("No such tag to watch: {name}");
            std::process::exit(1);
        };
        match driver.monitor(tag) {
            Ok(_) => watched.push((tag, name.clone())),
            Err(e) => {
                error!("Cannot watch {name}: {e}");
                std::process::exit(1);
            }
        }
    }

    let dt = Dt::from_millis(cli.dt_ms);
    for _ in 0..cli.scans {
        let events = match driver.step(dt) {
            Ok(events) => events,
            Err(e) => {
                error!("Scan failed: {}", e);
                std::process::exit(1);
            }
        };
        for event in events {
            if let Some((_, name)) = watched.iter().find(|(tag, _)| *tag == event.tag) {
                info!(scan = event.scan, tag = %name, value = %event.value, "changed");
            }
        }
    }

    info!(scans = cli.scans, "run complete");

    println!("scan {}", driver.current().scan_index());
    for (tag, decl) in driver.program().tags().iter() {
        match driver.current().read(tag) {
            Ok(value) => println!("  {:<24} {}", decl.name, value),
            Err(e) => println!("  {:<24} <{}>", decl.name, e),
        }
    }
}
