//! Crawler module for page extraction and batch processing
//!
//! This module contains the core harvesting logic, including:
//! - Work partitioning into batches
//! - Browser sessions and the login sequence
//! - List, detail and table extraction
//! - "Next page" pagination
//! - Image downloads
//! - Batch orchestration and overall crawl dispatch

mod batch;
mod category;
mod extractor;
mod fetcher;
mod lines;
mod list;
mod orchestrator;
mod paginator;
mod session;

pub use batch::{partition, partition_units, Batch, UnitRange};
pub use category::{parse_category_rows, CategoryCrawler, CategorySummary};
pub use extractor::{build_detail_record, DetailExtractor, DetailKind, DetailTimeouts, ListExtractor};
pub use fetcher::{
    build_http_client, image_file_name, is_http_url, ByteFetcher, FetchError, HttpFetcher,
    ImageFetcher,
};
pub use lines::{body_lines, MarkerGrammar, ScanError, ScannedBlocks, ScannedRow};
pub use list::{ListCrawler, ListSummary};
pub use orchestrator::{fail_units, process_batch, BatchContext, BatchOrchestrator};
pub use paginator::{Advance, PageConfirmation, Paginator, Termination};
pub use session::{LoginFlow, Session, SessionError, SessionProvider};

use crate::config::{Config, CrawlMode};
use crate::driver::{ChromeLauncher, DriverFactory};
use crate::output::{generate_markdown_summary, write_records, ProgressPersister, RunSummary};
use crate::state::{Record, ResultAccumulator};
use crate::HarvestError;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Per-run switches from the command line
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Ignore the progress snapshot of a previous run
    pub fresh: bool,

    /// Hash of the configuration file, recorded in the summary
    pub config_hash: String,
}

/// Runs a complete harvest with the Chrome driver and an HTTP image fetcher
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `options` - Command-line switches
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished; failed units are in the summary
/// * `Err(HarvestError)` - The run could not start
pub async fn crawl(config: &Config, options: &CrawlOptions) -> Result<RunSummary, HarvestError> {
    let factory: Arc<dyn DriverFactory> = Arc::new(ChromeLauncher::new(
        config.browser.clone(),
        config.timeouts.navigation(),
    ));
    let client = build_http_client(
        &config.browser.user_agent,
        Duration::from_secs(config.retry.fetch_timeout_secs),
    )?;
    let fetcher: Arc<dyn ByteFetcher> = Arc::new(HttpFetcher::new(client));

    crawl_with(config, options, factory, fetcher).await
}

/// Runs a complete harvest on the given driver factory and byte fetcher
pub async fn crawl_with(
    config: &Config,
    options: &CrawlOptions,
    factory: Arc<dyn DriverFactory>,
    fetcher: Arc<dyn ByteFetcher>,
) -> Result<RunSummary, HarvestError> {
    std::fs::create_dir_all(&config.output.directory)?;

    let mut summary = RunSummary::start(config.crawl.mode, options.config_hash.clone());
    let sessions = SessionProvider::new(
        factory,
        LoginFlow::for_site(&config.site.base_url, &config.timeouts),
        config.retry.login_policy(),
    );

    match config.crawl.mode {
        CrawlMode::DishList => run_list(config, sessions, &mut summary).await?,
        CrawlMode::IngredientCategories => run_categories(config, sessions, &mut summary).await?,
        CrawlMode::DishDetail => {
            run_detail(config, options, DetailKind::Dish, sessions, fetcher, &mut summary).await
        }
        CrawlMode::IngredientDetail => {
            run_detail(config, options, DetailKind::Ingredient, sessions, fetcher, &mut summary)
                .await
        }
    }

    summary.finish();
    let summary_path = config.output.summary_path();
    match generate_markdown_summary(&summary, &summary_path) {
        Ok(()) => tracing::info!("Summary written to {}", summary_path.display()),
        Err(e) => tracing::error!("Failed to write summary {}: {}", summary_path.display(), e),
    }

    Ok(summary)
}

/// The batches a run would dispatch, ignoring any progress snapshot
pub fn plan_batches(config: &Config) -> Vec<Batch> {
    if !config.crawl.mode.uses_unit_range() {
        return Vec::new();
    }
    partition(
        UnitRange::new(config.crawl.start, config.crawl.end),
        config.crawl.batch_size,
    )
}

/// Keeps the successful records of a previous run that fall inside `range`
///
/// Failed units are dropped so they are retried; a unit listed twice keeps its
/// first record.
pub fn resume_seed(records: Vec<Record>, range: UnitRange) -> ResultAccumulator {
    let mut seen = HashSet::new();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| r.is_success() && range.contains(r.id()) && seen.insert(r.id()))
        .collect();
    ResultAccumulator::from_records(kept)
}

async fn run_detail(
    config: &Config,
    options: &CrawlOptions,
    kind: DetailKind,
    sessions: SessionProvider,
    fetcher: Arc<dyn ByteFetcher>,
    summary: &mut RunSummary,
) {
    let range = UnitRange::new(config.crawl.start, config.crawl.end);
    let persister = ProgressPersister::new(config.output.progress_path());

    let seed = if options.fresh {
        tracing::info!("Fresh run, ignoring {}", persister.path().display());
        ResultAccumulator::new()
    } else {
        match persister.load() {
            Ok(Some(records)) => {
                let seed = resume_seed(records, range);
                tracing::info!("Resuming: {} units already done", seed.len());
                seed
            }
            Ok(None) => ResultAccumulator::new(),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable progress snapshot {}: {}",
                    persister.path().display(),
                    e
                );
                ResultAccumulator::new()
            }
        }
    };

    let done = seed.unit_ids();
    summary.range = Some((range.start, range.end));
    summary.units_total = range.len();
    summary.units_resumed = seed.len() as u64;

    let remaining = range.units().filter(|unit| !done.contains(unit));
    let batches = partition_units(remaining, config.crawl.batch_size);
    tracing::info!(
        "Harvesting {} {}: {} units, {} batches of up to {}, {} workers",
        kind_label(kind),
        range,
        range.len() as usize - done.len(),
        batches.len(),
        config.crawl.batch_size,
        config.crawl.max_concurrency
    );

    if config.credentials.is_none() {
        tracing::warn!("No credentials configured, detail pages are read without logging in");
    }

    let images = ImageFetcher::new(
        fetcher,
        config.retry.fetch_policy(),
        config.output.image_path(),
    );
    let context = BatchContext {
        sessions,
        extractor: DetailExtractor::new(
            kind,
            config.site.base_url.clone(),
            DetailTimeouts::from(&config.timeouts),
            Some(images),
        ),
        credentials: config.credentials.clone(),
        unit_delay: unit_delay(config),
    };

    let nothing_to_do = batches.is_empty();
    let orchestrator =
        BatchOrchestrator::new(context, config.crawl.max_concurrency).with_persister(persister.clone());
    let accumulator = orchestrator.run_batches(batches, seed).await;

    if nothing_to_do {
        if let Err(e) = persister.persist(&accumulator) {
            tracing::error!("Failed to write progress: {}", e);
        }
    }

    let complete = config.output.complete_path();
    match write_records(&complete, accumulator.records()) {
        Ok(()) => tracing::info!("Wrote {} records to {}", accumulator.len(), complete.display()),
        Err(e) => tracing::error!("Failed to write {}: {}", complete.display(), e),
    }

    summary.tally_records(accumulator.records());
    summary.outputs.push(persister.path().to_path_buf());
    summary.outputs.push(complete);
    summary.outputs.push(config.output.image_path());
}

async fn run_list(
    config: &Config,
    sessions: SessionProvider,
    summary: &mut RunSummary,
) -> Result<(), HarvestError> {
    let range = UnitRange::new(config.crawl.start, config.crawl.end);
    let result = ListCrawler::from_config(config, sessions).run().await?;

    summary.range = Some((range.start, range.end));
    summary.units_total = range.len();
    summary.units_succeeded = result.pages_with_rows;
    summary.rows_written = Some(result.rows);
    summary.record_failure("no rows extracted", result.pages_visited - result.pages_with_rows);

    let not_reached = range.len().saturating_sub(result.pages_visited);
    let reason = match &result.termination {
        Some(termination) => format!("not reached: {}", termination),
        None => "not reached".to_string(),
    };
    summary.record_failure(reason, not_reached);

    summary.outputs.push(config.output.csv_path());
    summary.outputs.extend(result.batch_files);
    Ok(())
}

async fn run_categories(
    config: &Config,
    sessions: SessionProvider,
    summary: &mut RunSummary,
) -> Result<(), HarvestError> {
    let result = CategoryCrawler::from_config(config, sessions).run().await?;

    summary.units_total = result.categories + result.categories_failed;
    summary.units_succeeded = result.categories;
    summary.rows_written = Some(result.rows);
    summary.record_failure("category skipped", result.categories_failed);
    if let Some(reason) = result.aborted {
        summary.record_failure(format!("crawl aborted: {}", reason), 1);
        summary.units_total += 1;
    }

    summary.outputs.push(config.output.csv_path());
    Ok(())
}

fn kind_label(kind: DetailKind) -> &'static str {
    match kind {
        DetailKind::Dish => "dishes",
        DetailKind::Ingredient => "ingredients",
    }
}

fn unit_delay(config: &Config) -> (Duration, Duration) {
    (
        Duration::from_millis(config.crawl.unit_delay_ms[0]),
        Duration::from_millis(config.crawl.unit_delay_ms[1]),
    )
}

/// Uniform random pause between `min` and `max`
pub(crate) fn pick_delay((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}
