//! `mailtriage` command-line front end.
//!
//! Replays a mailbox snapshot (JSON) through the triage pipeline, prints
//! the audit log and optionally writes the resulting mailbox back out.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailtriage_core::time::{Clock, FixedClock, SystemClock};
use mailtriage_core::transport::MemoryTransport;
use mailtriage_core::{Config, RunOptions, RunSummary, Triage};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mailtriage=debug,mailtriage_core=debug"
    } else {
        "mailtriage=info,mailtriage_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli) {
        Ok(summary) if summary.is_complete() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let config_path = cli.config_path()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!(
        "Loaded {} message filters and {} state filters from {}",
        config.message_filters.len(),
        config.state_filters.len(),
        config_path.display()
    );

    let snapshot = std::fs::read_to_string(&cli.mailbox)
        .with_context(|| format!("Failed to read mailbox {}", cli.mailbox.display()))?;
    let mut transport = MemoryTransport::from_json(&snapshot)
        .with_context(|| format!("Invalid mailbox snapshot {}", cli.mailbox.display()))?;

    let clock: Box<dyn Clock> = match cli.now {
        Some(now) => Box::new(FixedClock(now)),
        None => Box::new(SystemClock),
    };

    let summary = Triage::new(config)
        .run(
            &mut transport,
            &clock,
            RunOptions {
                dry_run: cli.dry_run,
            },
        )
        .context("Triage run failed")?;

    for record in &summary.audit {
        println!("{record}");
    }
    println!(
        "{} messages in {} threads, {} filtered: {} applied, {} skipped, {} failed",
        summary.messages,
        summary.threads,
        summary.filtered,
        summary.audit.applied(),
        summary.audit.skipped(),
        summary.audit.failed()
    );
    if let Some(err) = &summary.aborted {
        println!("run aborted: {err}");
    }

    if let Some(path) = &cli.write_back {
        let json = transport.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write mailbox to {}", path.display()))?;
        info!("Wrote mailbox to {}", path.display());
    }

    Ok(summary)
}
