//! invoice-recon - Invoice extraction and reconciliation CLI
//!
//! Runs OCR + pattern extraction and vision-language model extraction over
//! invoice images, reconciles the two per field and stores the resulting
//! records as JSON.
//!
//! Log level priority: `--log-level` > `RUST_LOG` > `[logging] level` > info

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use invoice_common::config::{write_toml_config, LoggingConfig};
use invoice_recon::extractors::PatternExtractor;
use invoice_recon::fusion::ReconciliationEngine;
use invoice_recon::validators::AnomalyDetector;
use invoice_recon::workflow::{
    discover_images, run_batch, BatchSummary, Collaborators, DocumentOutcome, InvoiceRecord,
    JsonDirectorySink, Pipeline,
};
use invoice_recon::{AppConfig, ExtractionMethod, ExtractionResult};

/// Command-line arguments for invoice-recon
#[derive(Parser, Debug)]
#[command(name = "invoice-recon")]
#[command(about = "Dual-method invoice extraction with field-level reconciliation")]
#[command(version)]
struct Args {
    /// Config file (overrides INVOICE_RECON_CONFIG and the platform default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides RUST_LOG and the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one invoice image
    Process {
        #[arg(long)]
        image: PathBuf,
        /// Directory for stored records
        #[arg(long)]
        output: Option<PathBuf>,
        /// Do not store the record
        #[arg(long)]
        no_save: bool,
    },

    /// Process every image in a directory
    Batch {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Documents processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        no_save: bool,
    },

    /// Reconcile two saved extraction results
    Reconcile {
        /// Pattern-side ExtractionResult JSON
        #[arg(long)]
        pattern: PathBuf,
        /// Model-side ExtractionResult JSON
        #[arg(long)]
        model: PathBuf,
    },

    /// Run the pattern extractor over a text file
    ExtractText {
        #[arg(long)]
        text: PathBuf,
    },

    /// Write the default configuration as TOML
    Config {
        #[arg(long, value_name = "PATH")]
        write_default: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging, args.log_level.as_deref())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting invoice-recon");

    match args.command {
        Command::Config { write_default } => {
            write_toml_config(&AppConfig::default(), &write_default)?;
            println!("Default configuration written to {}", write_default.display());
            Ok(())
        }
        Command::Process {
            image,
            output,
            no_save,
        } => process(validated(config)?, &image, output, no_save).await,
        Command::Batch {
            dir,
            output,
            concurrency,
            no_save,
        } => batch(validated(config)?, &dir, output, concurrency, no_save).await,
        Command::Reconcile { pattern, model } => reconcile(&validated(config)?, &pattern, &model),
        Command::ExtractText { text } => extract_text(&validated(config)?, &text),
    }
}

/// Reject a config with consistency problems, logging each one
fn validated(config: AppConfig) -> Result<AppConfig> {
    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            error!("Invalid configuration: {}", issue);
        }
        bail!("Configuration has {} problem(s)", issues.len());
    }
    Ok(config)
}

/// Initialize tracing from CLI, environment and config
fn init_tracing(logging: &LoggingConfig, cli_level: Option<&str>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&logging.level).context("Invalid [logging] level")?,
        },
    };

    let registry = tracing_subscriber::registry().with(filter);
    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn build_pipeline(config: &AppConfig, output: Option<PathBuf>, no_save: bool) -> Result<Pipeline> {
    let pipeline = Pipeline::new(config, Collaborators::from_config(config))?;
    if no_save {
        return Ok(pipeline);
    }
    let dir = output.unwrap_or_else(|| config.pipeline.output_dir.clone());
    Ok(pipeline.with_sink(Arc::new(JsonDirectorySink::new(dir))))
}

async fn process(config: AppConfig, image: &Path, output: Option<PathBuf>, no_save: bool) -> Result<()> {
    let pipeline = build_pipeline(&config, output, no_save)?;

    match pipeline.process(image).await? {
        DocumentOutcome::Processed(record) => {
            print_record(&record);
            Ok(())
        }
        DocumentOutcome::Failed(failed) => bail!("{}: {}", failed.source_path.display(), failed.error),
    }
}

async fn batch(
    mut config: AppConfig,
    dir: &Path,
    output: Option<PathBuf>,
    concurrency: Option<usize>,
    no_save: bool,
) -> Result<()> {
    if let Some(n) = concurrency {
        if n == 0 {
            bail!("--concurrency must be at least 1");
        }
        config.pipeline.batch_concurrency = n;
    }

    let images = discover_images(dir)?;
    if images.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }

    let pipeline = build_pipeline(&config, output, no_save)?;
    let outcomes = run_batch(&pipeline, images).await;

    for outcome in &outcomes {
        match outcome {
            DocumentOutcome::Processed(record) => println!(
                "{}: completeness {:.0}%, agreement {:.0}%, {} anomalies, {} errors",
                record.source_path.display(),
                record.metrics.data_completeness * 100.0,
                record.metrics.agreement_rate * 100.0,
                record.anomalies.len(),
                record.errors.len()
            ),
            DocumentOutcome::Failed(failed) => {
                println!("{}: FAILED ({})", failed.source_path.display(), failed.error)
            }
        }
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    println!();
    println!("Documents:          {}", summary.total);
    println!("Processed:          {}", summary.processed);
    println!("Failed:             {}", summary.failed);
    println!("With errors:        {}", summary.with_errors);
    println!("Success rate:       {:.1}%", summary.success_rate * 100.0);
    println!("Mean completeness:  {:.1}%", summary.mean_completeness * 100.0);
    println!("Mean agreement:     {:.1}%", summary.mean_agreement * 100.0);
    println!("Anomalies:          {}", summary.total_anomalies);
    Ok(())
}

fn reconcile(config: &AppConfig, pattern_path: &Path, model_path: &Path) -> Result<()> {
    let pattern = read_extraction(pattern_path, ExtractionMethod::Pattern)?;
    let model = read_extraction(model_path, ExtractionMethod::Model)?;

    let engine = ReconciliationEngine::new(config.reconcile.clone(), &config.schema)?;
    let reconciliation = engine.reconcile(&pattern, &model)?;
    let anomalies = AnomalyDetector::new(&config.anomaly).detect(&reconciliation.verdicts);

    let report = json!({
        "verdicts": reconciliation.verdicts,
        "metrics": reconciliation.metrics,
        "recommendation": reconciliation.recommendation,
        "recommendation_message": reconciliation.recommendation.message(),
        "anomalies": anomalies,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_extraction(path: &Path, method: ExtractionMethod) -> Result<ExtractionResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    ExtractionResult::from_json(method, &json)
        .with_context(|| format!("{} is not a {} extraction result", path.display(), method))
}

fn extract_text(config: &AppConfig, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let result = PatternExtractor::new(&config.schema)?.extract(&text);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn print_record(record: &InvoiceRecord) {
    println!("Document:       {}", record.source_path.display());
    println!("Completeness:   {:.1}%", record.metrics.data_completeness * 100.0);
    println!("Agreement:      {:.1}%", record.metrics.agreement_rate * 100.0);
    println!("Recommendation: {}", record.recommendation);
    println!("Time:           {:.2}s", record.processing_time_seconds);

    println!();
    for verdict in &record.verdicts {
        let value = verdict
            .recommended_value
            .as_ref()
            .map(invoice_recon::types::value_text)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<32} [{}{}]",
            verdict.field,
            value,
            verdict.recommended_method,
            if verdict.values_match { ", agreed" } else { "" }
        );
    }

    if !record.anomalies.is_empty() {
        println!();
        println!("Anomalies:");
        for anomaly in &record.anomalies {
            println!("  {} (score {:.2}): {}", anomaly.field, anomaly.score, anomaly.reason);
        }
    }
    if !record.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &record.errors {
            println!("  {}", e);
        }
    }
    if !record.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &record.warnings {
            println!("  {}", w);
        }
    }
}
