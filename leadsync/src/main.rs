//! LeadSync - CRM lead to spreadsheet exporter
//!
//! CLI entry point for running, scheduling and previewing export cycles.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, error, info};

use leadsync::cli::{CacheCommand, Cli, Command};
use leadsync::config::Config;
use leadsync::cycle::collect_entries;
use leadsync::{
    CycleReport, Exporter, FetchOptions, GoogleSheetsClient, LeadFetcher, OkoCrmClient, Reconciler, Throttled,
    TransformOptions,
};
use memostore::MemoStore;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leadsync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("leadsync.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Sync => cmd_sync(&config).await,
        Command::Watch { interval } => cmd_watch(&config, interval).await,
        Command::Preview => cmd_preview(&config).await,
        Command::Cache { command } => cmd_cache(&config, command),
    }
}

fn open_cache(config: &Config) -> Result<Arc<MemoStore>> {
    let store = MemoStore::open(&config.cache.path)
        .context(format!("Failed to open cache at {}", config.cache.path.display()))?;
    Ok(Arc::new(store))
}

fn build_fetcher(config: &Config) -> Result<LeadFetcher> {
    let crm = OkoCrmClient::from_config(&config.crm).context("Failed to create CRM client")?;
    let options = FetchOptions::from_config(config)?;
    Ok(LeadFetcher::new(Arc::new(crm), open_cache(config)?, options))
}

fn transform_options(config: &Config) -> Result<TransformOptions> {
    Ok(TransformOptions {
        timezone: config.export.timezone()?,
        lead_url: config.crm.lead_url.clone(),
    })
}

fn build_exporter(config: &Config) -> Result<Exporter> {
    config.validate()?;

    let google = GoogleSheetsClient::from_config(&config.sheets).context("Failed to create spreadsheet client")?;
    let sheets = Throttled::new(google, config.sheets.write_interval());
    let reconciler =
        Reconciler::new(Arc::new(sheets), config.sheets.template_title.clone()).with_retry(config.retry.policy());

    Ok(Exporter::new(build_fetcher(config)?, reconciler, transform_options(config)?))
}

fn print_report(report: &CycleReport, started: DateTime<Utc>) {
    println!(
        "{} {} leads, {} rows ({} inserted, {} updated, {} unchanged) in {}s",
        "✓".green(),
        report.leads,
        report.rows,
        report.inserted().to_string().green(),
        report.updated().to_string().yellow(),
        report.unchanged().to_string().dimmed(),
        (Utc::now() - started).num_seconds()
    );
    for (title, sheet) in &report.sheets {
        println!(
            "  {}: +{} ~{} ={}",
            title.cyan(),
            sheet.inserted,
            sheet.updated,
            sheet.unchanged
        );
    }
}

/// Run one cycle
async fn cmd_sync(config: &Config) -> Result<()> {
    debug!("cmd_sync: called");
    let exporter = build_exporter(config)?;
    let started = Utc::now();
    let report = exporter.run_cycle(started).await?;
    print_report(&report, started);
    Ok(())
}

/// Run cycles until interrupted; a failed cycle is logged and the next one still runs
async fn cmd_watch(config: &Config, interval: Option<u64>) -> Result<()> {
    let interval = interval
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.schedule.interval());
    debug!(?interval, "cmd_watch: called");
    let exporter = build_exporter(config)?;

    println!(
        "Watching: one cycle every {}s (Ctrl-C to stop)",
        interval.as_secs().to_string().cyan()
    );
    loop {
        let started = Utc::now();
        match exporter.run_cycle(started).await {
            Ok(report) => print_report(&report, started),
            Err(e) => {
                error!(error = ?e, "Export cycle failed");
                eprintln!("{} Cycle failed: {:#}", "✗".red(), e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                println!("Stopped");
                return Ok(());
            }
        }
    }
}

/// Print the rows the next cycle would write
async fn cmd_preview(config: &Config) -> Result<()> {
    debug!("cmd_preview: called");
    let fetcher = build_fetcher(config)?;
    let entries = collect_entries(&fetcher, &transform_options(config)?, Utc::now()).await?;

    if entries.is_empty() {
        println!("No leads to export");
        return Ok(());
    }
    for entry in &entries {
        for data in std::iter::once(&entry.primary).chain(entry.secondary.as_ref()) {
            println!(
                "{} {} {} | {} | {} | premium {} | agent {} ({}%)",
                entry.sheet.cyan(),
                data.id.yellow(),
                data.arrived_at.dimmed(),
                data.client,
                data.policy_type,
                data.premium,
                data.agent_amount,
                data.agent_percent
            );
        }
    }
    Ok(())
}

fn cmd_cache(config: &Config, command: CacheCommand) -> Result<()> {
    debug!(?command, "cmd_cache: called");
    let store = open_cache(config)?;
    match command {
        CacheCommand::List => {
            let keys = store.keys()?;
            if keys.is_empty() {
                println!("Cache is empty ({})", store.path().display());
            }
            for info in keys {
                let expires = DateTime::<Utc>::from_timestamp_millis(info.expires_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| info.expires_at.to_string());
                if info.expired {
                    println!("{} {}", info.key.dimmed(), format!("expired {}", expires).red());
                } else {
                    println!("{} {}", info.key.yellow(), format!("until {}", expires).dimmed());
                }
            }
        }
        CacheCommand::Forget { key } => {
            if store.forget(&key)? {
                println!("{} Forgot {}", "✓".green(), key.cyan());
            } else {
                println!("No cache entry for {}", key);
            }
        }
        CacheCommand::Purge => {
            let removed = store.purge_expired()?;
            println!("{} Removed {} expired entries", "✓".green(), removed);
        }
    }
    Ok(())
}
