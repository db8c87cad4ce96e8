//! Nutri-Harvest main entry point
//!
//! This is the command-line interface for the Nutri-Harvest nutrition database harvester.

use anyhow::Context;
use clap::Parser;
use nutri_harvest::config::{load_config_with_hash, Config};
use nutri_harvest::crawler::{crawl, plan_batches, CrawlOptions};
use nutri_harvest::output::print_summary;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Nutri-Harvest: a batched, resumable nutrition-database harvester
///
/// Nutri-Harvest drives headless browser sessions over the dish and
/// ingredient pages of a nutrition database, splitting the work into
/// batches that run in parallel and checkpointing results after every batch.
#[derive(Parser, Debug)]
#[command(name = "nutri-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A batched, resumable nutrition-database harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start from scratch, ignoring the progress file of a previous run
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the batch plan without launching a browser
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let options = CrawlOptions {
        fresh: cli.fresh,
        config_hash,
    };
    handle_crawl(&config, &options).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("nutri_harvest=info,warn"),
            1 => EnvFilter::new("nutri_harvest=debug,info"),
            2 => EnvFilter::new("nutri_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and the batch plan
fn handle_dry_run(config: &Config) {
    println!("=== Nutri-Harvest Dry Run ===\n");

    println!("Crawl:");
    println!("  Mode: {}", config.crawl.mode);
    if config.crawl.mode.uses_unit_range() {
        println!(
            "  Range: {}-{} ({} units)",
            config.crawl.start,
            config.crawl.end,
            config.crawl.unit_count()
        );
    }
    println!("  Batch size: {}", config.crawl.batch_size);
    println!("  Max concurrency: {}", config.crawl.max_concurrency);
    println!(
        "  Delay between units: {}-{}ms",
        config.crawl.unit_delay_ms[0], config.crawl.unit_delay_ms[1]
    );

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    match &config.credentials {
        Some(credentials) => println!("  Login as: {}", credentials.username),
        None => println!("  Login: none"),
    }

    println!("\nBrowser:");
    println!("  Headless: {}", config.browser.headless);
    match &config.browser.executable {
        Some(path) => println!("  Executable: {}", path.display()),
        None => println!("  Executable: auto-detect"),
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory.display());
    if config.crawl.mode.is_detail() {
        println!("  Progress: {}", config.output.progress_path().display());
        println!("  Complete: {}", config.output.complete_path().display());
        println!("  Images: {}", config.output.image_path().display());
    } else {
        println!("  CSV: {}", config.output.csv_path().display());
    }
    println!("  Summary: {}", config.output.summary_path().display());

    let batches = plan_batches(config);
    if !batches.is_empty() {
        println!("\nBatch plan ({} batches):", batches.len());
        for batch in &batches {
            let first = batch.units.first().copied().unwrap_or_default();
            let last = batch.units.last().copied().unwrap_or_default();
            println!("  - batch {}: {}-{} ({} units)", batch.number, first, last, batch.len());
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, options: &CrawlOptions) -> anyhow::Result<()> {
    if options.fresh {
        tracing::info!("Starting fresh run (ignoring previous progress)");
    } else {
        tracing::info!("Starting run (will resume from previous progress if any)");
    }

    match crawl(config, options).await {
        Ok(summary) => {
            tracing::info!("Run completed");
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
