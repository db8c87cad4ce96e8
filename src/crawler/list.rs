//! Paginated dish list crawl
//!
//! The list view is one client-side paginated table, so the whole crawl runs
//! on a single session. Pages are grouped into batches of `batch_size` pages;
//! each batch is written to its own CSV file and appended to the cumulative
//! one as soon as it is complete.

use crate::config::{Config, Credentials, OutputConfig};
use crate::crawler::batch::UnitRange;
use crate::crawler::extractor::ListExtractor;
use crate::crawler::paginator::{Advance, PageConfirmation, Paginator, Termination};
use crate::crawler::pick_delay;
use crate::crawler::session::{SessionError, SessionProvider};
use crate::driver::{Locator, PageDriver};
use crate::output::{append_csv, write_csv};
use crate::state::ListRow;
use std::path::PathBuf;
use std::time::Duration;

/// What a list crawl did
#[derive(Debug, Clone, Default)]
pub struct ListSummary {
    pub pages_visited: u64,
    pub pages_with_rows: u64,
    pub rows: u64,

    /// Per-batch CSV files written, in batch order
    pub batch_files: Vec<PathBuf>,

    /// Why pagination ended early, if it did
    pub termination: Option<Termination>,
}

/// Crawls the dish list page by page
pub struct ListCrawler {
    sessions: SessionProvider,
    credentials: Option<Credentials>,
    extractor: ListExtractor,
    list_url: String,
    range: UnitRange,
    pages_per_batch: usize,
    navigation_timeout: Duration,
    pagination_timeout: Duration,
    unit_delay: (Duration, Duration),
    output: OutputConfig,
}

impl ListCrawler {
    /// Builds the crawler for the configured page range
    pub fn from_config(config: &Config, sessions: SessionProvider) -> Self {
        Self {
            sessions,
            credentials: config.credentials.clone(),
            extractor: ListExtractor::new(
                config.timeouts.list_container(),
                config.crawl.rows_per_page,
            ),
            list_url: format!(
                "{}/database/list?id=2",
                config.site.base_url.trim_end_matches('/')
            ),
            range: UnitRange::new(config.crawl.start, config.crawl.end),
            pages_per_batch: config.crawl.batch_size.max(1),
            navigation_timeout: config.timeouts.navigation(),
            pagination_timeout: config.timeouts.pagination(),
            unit_delay: (
                Duration::from_millis(config.crawl.unit_delay_ms[0]),
                Duration::from_millis(config.crawl.unit_delay_ms[1]),
            ),
            output: config.output.clone(),
        }
    }

    /// Runs the crawl
    ///
    /// # Errors
    ///
    /// Only when the browser cannot be started at all.
    pub async fn run(&self) -> Result<ListSummary, SessionError> {
        let mut session = self.sessions.acquire("list crawl").await?;

        if let Some(credentials) = &self.credentials {
            if !self.sessions.authenticate(&mut session, credentials).await {
                tracing::warn!("Login failed, crawling the list anonymously");
            }
        }

        let summary = self.crawl_pages(session.driver()).await;
        self.sessions.release(session).await;
        Ok(summary)
    }

    async fn crawl_pages(&self, driver: &mut dyn PageDriver) -> ListSummary {
        let mut summary = ListSummary::default();

        tracing::info!(
            "Crawling list pages {} in batches of {} pages",
            self.range,
            self.pages_per_batch
        );
        if let Err(e) = driver.navigate(&self.list_url, self.navigation_timeout).await {
            if e.is_fatal() {
                summary.termination = Some(Termination::SessionLost(e.to_string()));
                return summary;
            }
            tracing::warn!("List page load incomplete, continuing: {}", e);
        }

        let mut paginator = Paginator::new(
            Locator::css("button.btn-next"),
            PageConfirmation::SourceContains,
            self.pagination_timeout,
        );

        // Pages before the range are clicked through, not extracted
        while paginator.current_page() < self.range.start {
            if let Advance::Finished(termination) = paginator.advance(driver).await {
                tracing::warn!(
                    "List ended on page {} before reaching page {}",
                    paginator.current_page(),
                    self.range.start
                );
                summary.termination = Some(termination);
                return summary;
            }
        }

        let mut pending: Vec<ListRow> = Vec::new();
        let mut pages_in_batch = 0;
        let mut batch_number = 1;

        loop {
            let page = paginator.current_page();
            let rows = self.extractor.extract_list_page(driver, page).await;
            summary.pages_visited += 1;
            if !rows.is_empty() {
                tracing::info!("Page {}: {} rows", page, rows.len());
                summary.pages_with_rows += 1;
                summary.rows += rows.len() as u64;
                pending.extend(rows);
            }
            pages_in_batch += 1;

            if pages_in_batch == self.pages_per_batch {
                // Numbers are only used up by files that were written
                if self.flush(&mut pending, batch_number, &mut summary) {
                    batch_number += 1;
                }
                pages_in_batch = 0;
            }

            if page >= self.range.end {
                break;
            }

            match paginator.advance(driver).await {
                Advance::Loaded(_) => tokio::time::sleep(pick_delay(self.unit_delay)).await,
                Advance::Finished(termination) => {
                    summary.termination = Some(termination);
                    break;
                }
            }
        }

        if pages_in_batch > 0 {
            self.flush(&mut pending, batch_number, &mut summary);
        }

        tracing::info!(
            "List crawl done: {} pages, {} rows",
            summary.pages_visited,
            summary.rows
        );
        summary
    }

    /// Writes one batch file and appends it to the cumulative table
    ///
    /// Returns `true` when the batch file was written.
    fn flush(&self, pending: &mut Vec<ListRow>, batch_number: u32, summary: &mut ListSummary) -> bool {
        if pending.is_empty() {
            tracing::warn!("Batch {}: no rows to save", batch_number);
            return false;
        }

        let batch_path = self.output.batch_path(batch_number);
        let written = write_csv(&batch_path, pending)
            .and_then(|()| append_csv(&self.output.csv_path(), pending));

        match written {
            Ok(()) => {
                tracing::info!(
                    "Batch {}: saved {} rows to {} ({} rows so far)",
                    batch_number,
                    pending.len(),
                    batch_path.display(),
                    summary.rows
                );
                summary.batch_files.push(batch_path);
                pending.clear();
                true
            }
            Err(e) => {
                tracing::error!("Batch {}: failed to save rows: {}", batch_number, e);
                pending.clear();
                false
            }
        }
    }
}
