mod config;
mod input;
mod mapping;
mod models;
mod notify;
mod output;
mod pipeline;
mod scraper;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::input::load_input;
use crate::mapping::FieldMapping;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "fpds-scraper", about = "FPDS award lookup bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Look up every row of an input sheet and write the results
    Run {
        /// Input CSV with a search-name column
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (default: paths.output_dir from config)
        #[arg(short, long, env = "FPDS_OUT_DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Check that the search page is reachable and has its search form
    Validate,

    /// Show the output columns from the mapping file
    Columns,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "fpds_scraper=info,warn",
        1 => "fpds_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    info!("FPDS bot execution started");
    let started = Instant::now();

    let config = AppConfig::load()?;
    let notifier: Box<dyn Notifier> = match &config.notifier.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url)),
        None => Box::new(LogNotifier),
    };

    let result = match cli.command {
        Command::Run { input, out_dir } => run(&config, &input, out_dir, notifier.as_ref()).await,

        Command::Validate => validate(&config).await,
        Command::Columns => columns(&config),
    };

    info!("FPDS bot execution ended ({:.2?})", started.elapsed());
    result
}

async fn validate(config: &AppConfig) -> Result<()> {
    let pipeline = Pipeline::from_config(config, FieldMapping::default())?;
    pipeline.scraper().validate().await?;
    println!("Search page OK: {}", config.scraper.search_url);
    Ok(())
}

fn columns(config: &AppConfig) -> Result<()> {
    let mapping = FieldMapping::load(&config.paths.mapping)?;
    if mapping.is_empty() {
        println!("Mapping {:?} defines no columns.", config.paths.mapping);
        return Ok(());
    }
    println!("{} columns:", mapping.len());
    for (column, rule) in mapping.entries() {
        match &rule.source_tag_id {
            Some(id) => println!("  {:<32} ← #{} ({:?})", column, id, rule.kind),
            None => println!("  {:<32} (not scraped)", column),
        }
    }
    Ok(())
}

async fn run(
    config: &AppConfig,
    input_path: &Path,
    out_dir: Option<PathBuf>,
    notifier: &dyn Notifier,
) -> Result<()> {
    match process(config, input_path, out_dir, notifier).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let handled = e
                .downcast_ref::<scraper::ScrapeError>()
                .is_some_and(|s| s.is_handled());
            if handled {
                // already reported by the pipeline
                warn!("Run aborted: {:#}", e);
                return Ok(());
            }
            error!("Unexpected failure: {:#}", e);
            if let Err(notify_err) = notifier.notify_failure(&format!("unexpected error: {:#}", e)).await {
                error!("Could not report failure: {:#}", notify_err);
            }
            Err(e)
        }
    }
}

async fn process(
    config: &AppConfig,
    input_path: &Path,
    out_dir: Option<PathBuf>,
    notifier: &dyn Notifier,
) -> Result<()> {
    let mapping = FieldMapping::load(&config.paths.mapping)?;
    let sheet = load_input(input_path, &config.input)
        .with_context(|| format!("Rejected input sheet {:?}", input_path))?;
    let out_dir = output::ensure_dir(&out_dir.unwrap_or_else(|| config.paths.output_dir.clone()))?;

    if sheet.has_non_processed() {
        let path = out_dir.join(&config.output.non_processed_file);
        output::write_rows(&sheet.header, &sheet.non_processed, &path)?;
        warn!("{} rows had no search name; see {:?}", sheet.non_processed.len(), path);
    }

    let names = sheet.search_names();
    if names.is_empty() {
        println!("Nothing to search.");
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config, mapping)?;
    let out = pipeline.run(&names, notifier).await?;

    output::write_status_sheet(
        &sheet.header,
        &sheet.processed,
        &out.success,
        &config.input.status_column,
        &out_dir.join(&config.output.processed_file),
    )?;

    let found = out.success.iter().filter(|f| **f).count();
    println!("─────────────────────────────────");
    println!("  FPDS lookup");
    println!("─────────────────────────────────");
    println!("  Names    : {}", names.len());
    println!("  Found    : {}", found);
    println!("  Records  : {}", out.table.len());
    println!("  Skipped  : {}", sheet.non_processed.len());

    if !out.table.is_empty() {
        let file = output::results_file_name(
            &config.output.results_file,
            &config.output.date_format,
            chrono::Local::now(),
        );
        let path = out_dir.join(file);
        output::write_results(&out.table, &path)?;
        println!("  Results  : {}", path.display());
    }
    println!("─────────────────────────────────");

    Ok(())
}
