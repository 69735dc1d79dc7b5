//! `wbuf` - CLI for writebuffer
//!
//! Submits records through the offline write buffer, watches connectivity
//! and flushes buffered records, and inspects the local store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info};

use writebuffer::cli::{Cli, Command, ConfigCommand, RunCommand, SubmitCommand};
use writebuffer::connectivity::{ConnectivitySignal, ConnectivityState};
use writebuffer::reachability::ReachabilityProbe;
use writebuffer::remote::endpoint_url;
use writebuffer::{
    init_logging, Config, ConsoleNotifier, FlushOutcome, PendingRecord, WriteBuffer, WriteOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // Validation must work even when the default config is broken
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        validate_config(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Run(run_cmd) => handle_run(&config, &run_cmd).await,
        Command::Submit(submit_cmd) => handle_submit(&config, submit_cmd).await,
        Command::Flush => handle_flush(&config).await,
        Command::Pending(pending_cmd) => handle_pending(&config, pending_cmd.json).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json).await,
        Command::Config(config_cmd) => handle_config(&config, &config_cmd),
    }
}

fn build_buffer(config: &Config) -> anyhow::Result<WriteBuffer> {
    Ok(WriteBuffer::from_config(config, Arc::new(ConsoleNotifier))?)
}

async fn open_buffer(config: &Config) -> anyhow::Result<WriteBuffer> {
    let buffer = build_buffer(config)?;
    if !buffer.open().await {
        bail!(
            "local store at {} could not be opened",
            config.database_path().display()
        );
    }
    Ok(buffer)
}

async fn handle_run(config: &Config, cmd: &RunCommand) -> anyhow::Result<()> {
    let buffer = open_buffer(config).await?;

    let url = endpoint_url(&config.remote.base_url, &config.remote.resource)?;
    let probe = ReachabilityProbe::for_url(&url, config.probe_timeout())?;
    let initial = if cmd.start_offline {
        ConnectivityState::Offline
    } else {
        probe.check().await
    };
    info!(addr = %probe.target(), state = %initial, "Watching connectivity");

    let signal = ConnectivitySignal::new(initial);
    let agent = buffer.agent().start(&signal.monitor());
    let probe = probe.spawn(signal.clone(), config.probe_interval());

    println!("Watching {url}. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    probe.stop().await;
    agent.shutdown().await;
    Ok(())
}

async fn handle_submit(config: &Config, cmd: SubmitCommand) -> anyhow::Result<()> {
    let text = match (cmd.record, cmd.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read record from stdin")?;
            text
        }
    };
    let record = PendingRecord::from_json(&text).context("record is not valid JSON")?;

    let buffer = build_buffer(config)?;
    buffer.open().await;

    match buffer.interceptor().create(record).await? {
        WriteOutcome::Delivered(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        WriteOutcome::Buffered { key } => debug!(key, "Record buffered"),
        WriteOutcome::Unsaved { reason } => {
            bail!("server unreachable and the record could not be saved locally: {reason}")
        }
    }
    Ok(())
}

async fn handle_flush(config: &Config) -> anyhow::Result<()> {
    let buffer = open_buffer(config).await?;

    match buffer.agent().flush().await {
        FlushOutcome::Delivered { count } => debug!(count, "Flush complete"),
        FlushOutcome::Empty => println!("No pending records."),
        FlushOutcome::AlreadyFlushing => println!("A flush is already running."),
        FlushOutcome::Failed { count, reason } => {
            bail!("could not submit {count} pending records: {reason}")
        }
        FlushOutcome::StoreUnavailable { reason } => {
            bail!("could not read pending records: {reason}")
        }
    }
    Ok(())
}

async fn handle_pending(config: &Config, json: bool) -> anyhow::Result<()> {
    let buffer = open_buffer(config).await?;
    let entries = buffer.store().entries().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No pending records.");
        return Ok(());
    }

    println!("{:>6}  {:<25}  RECORD", "KEY", "QUEUED");
    for entry in &entries {
        println!(
            "{:>6}  {:<25}  {}",
            entry.key,
            entry.queued_at.to_rfc3339(),
            entry.record.to_json()?
        );
    }
    Ok(())
}

async fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let buffer = open_buffer(config).await?;
    let stats = buffer.store().stats().await?;
    let endpoint = buffer.remote().endpoint();

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "endpoint": endpoint,
            "store": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("wbuf status");
        println!("-----------");
        println!("Database:      {}", config.database_path().display());
        println!("Endpoint:      {endpoint}");
        println!("Pending:       {}", stats.pending_records);
        if let Some(oldest) = stats.oldest_queued {
            println!("Oldest:        {}", oldest.to_rfc3339());
        }
        if let Some(newest) = stats.newest_queued {
            println!("Newest:        {}", newest.to_rfc3339());
        }
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max pending:        {}", config.store.max_pending);
                println!();
                println!("[Remote]");
                println!("  Base URL:           {}", config.remote.base_url);
                println!("  Resource:           {}", config.remote.resource);
                println!("  Error field:        {}", config.remote.error_field);
                println!();
                println!("[Connectivity]");
                println!(
                    "  Probe interval:     {} ms",
                    config.connectivity.probe_interval_ms
                );
                println!(
                    "  Probe timeout:      {} ms",
                    config.connectivity.probe_timeout_ms
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            validate_config(file.clone());
        }
    }
    Ok(())
}

fn validate_config(file: Option<PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}
