//! platelens - dish photo analysis with tiered result caching
//!
//! A photo is resolved to an [`record::AnalysisRecord`] by checking, in
//! order, a caller-owned local cache (exact bytes, then perceptual
//! similarity), a shared SQLite store (exact bytes, then dish name), and
//! finally a two-stage model pipeline whose output is written back to both
//! caches.
//!
//! The [`coordinator::CacheCoordinator`] is the entry point; [`run_app`]
//! wires it to configuration for the command-line binary.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod record;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use cache::{LocalTier, PersistentTier};
use cli::{AnalyzeArgs, Cli, Commands, OutputFormat, PurgeArgs};
use config::Config;
use coordinator::{CacheCoordinator, PurgeSummary};
use error::ExitCode;
use output::{JsonOutput, JsonPurge, TextOutput};
use pipeline::{AnalysisPipeline, HttpModelClient};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Pipeline failures are returned as [`pipeline::PipelineError`] inside the
/// `anyhow::Error`, so the caller can map them to exit codes.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    if cli.no_color {
        yansi::disable();
    }

    let config = load_config(&cli)?;
    log::debug!("Configuration: {:?}", config);

    match &cli.command {
        Commands::Analyze(args) => analyze(&config, args),
        Commands::Purge(args) => purge(&config, args),
        Commands::Stats => stats(&config),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::try_load_from_path(path)
        }
        None => Config::try_load_from_path(&Config::config_path()?),
    }
}

/// Build a coordinator from configuration.
///
/// `api_key` may be empty for commands that never reach the model.
pub fn build_coordinator(config: &Config, api_key: &str) -> Result<CacheCoordinator> {
    let persistent = PersistentTier::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open analysis store {}",
            config.database_path.display()
        )
    })?;
    let local = LocalTier::open(config.local_tier());

    let client = HttpModelClient::new(
        config.model.base_url.clone(),
        api_key,
        Duration::from_secs(config.model.timeout_secs),
    )
    .context("Failed to create model client")?;
    let pipeline = AnalysisPipeline::new(Arc::new(client), config.model.pipeline_settings());

    Ok(CacheCoordinator::new(local, persistent, pipeline))
}

fn analyze(config: &Config, args: &AnalyzeArgs) -> Result<ExitCode> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let api_key = config.model.api_key()?;
    let mut coordinator = build_coordinator(config, &api_key)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let resolution = runtime.block_on(coordinator.resolve(&bytes))?;
    log::info!(
        "Resolved {} as '{}' ({})",
        args.image.display(),
        resolution.record.subject_name,
        resolution.origin
    );

    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Json => JsonOutput::new(&resolution).write_to(&mut stdout)?,
        OutputFormat::Text => TextOutput::new(&resolution).write_to(&mut stdout)?,
    }
    stdout.flush()?;
    Ok(ExitCode::Success)
}

fn purge(config: &Config, args: &PurgeArgs) -> Result<ExitCode> {
    let mut coordinator = build_coordinator(config, "")?;

    let purged = if args.all {
        coordinator.purge_all()
    } else if let Some(days) = args.older_than {
        coordinator.purge_older_than(days)
    } else if let Some(name) = &args.category {
        coordinator.purge_by_category(name)
    } else if let Some(kcal) = args.above_calories {
        coordinator.purge_above_calories(kcal)
    } else {
        anyhow::bail!("No purge selector given");
    };
    let summary: PurgeSummary = purged.context("Failed to purge analysis store")?;

    log::info!("Purged {} analyses", summary.total());
    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Text => output::write_purge(&mut stdout, &summary)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &JsonPurge::from(summary))?;
            writeln!(stdout)?;
        }
    }
    Ok(ExitCode::Success)
}

fn stats(config: &Config) -> Result<ExitCode> {
    let coordinator = build_coordinator(config, "")?;
    let rows = coordinator
        .persistent()
        .count()
        .context("Failed to count stored analyses")?;
    let mut stdout = io::stdout().lock();
    output::write_stats(&mut stdout, &coordinator.local().stats(), rows)?;
    Ok(ExitCode::Success)
}
