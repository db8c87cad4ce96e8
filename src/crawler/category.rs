//! Ingredient category table crawl
//!
//! Walks every primary category, and inside it every secondary category, of
//! the ingredient table view, paging through the composition table of each.
//! A category's rows are appended to the CSV as soon as it is done. A failure
//! inside one category is logged and the crawl moves on; only losing the
//! browser ends it early.

use crate::config::{Config, OutputConfig};
use crate::crawler::paginator::{Advance, PageConfirmation, Paginator, Termination};
use crate::crawler::pick_delay;
use crate::crawler::session::{SessionError, SessionProvider};
use crate::driver::{Condition, Document, DriverError, DriverResult, Locator, PageDriver};
use crate::output::append_csv;
use crate::state::CategoryRow;
use std::time::Duration;

const PAGE_CONTAINER: &str = ".database-warp-container";
const TABLE_ROW: &str = ".el-table__body tr.el-table__row";
const TABLE_CELL: &str = "td.el-table__cell";

/// Filter entry that stands for "every category"
const ALL_CATEGORIES: &str = "全部";

/// Cells a table row must have; cells 2 to 9 carry the data
const ROW_CELLS: usize = 10;

/// Category filter items below the "<level>分类：" label
fn category_items(level: &str) -> Locator {
    Locator::xpath(format!(
        "//div[contains(text(), '{}分类：')]/following-sibling::div[@class='field-detail']\
         //*[contains(concat(' ', normalize-space(@class), ' '), ' field-group-item ')]",
        level
    ))
}

/// What a category crawl did
#[derive(Debug, Clone, Default)]
pub struct CategorySummary {
    /// Categories whose table was read
    pub categories: u64,

    /// Categories skipped after an error
    pub categories_failed: u64,

    pub rows: u64,

    /// Set when the browser went away mid-crawl
    pub aborted: Option<String>,
}

/// Crawls the ingredient table category by category
pub struct CategoryCrawler {
    sessions: SessionProvider,
    list_url: String,
    navigation_timeout: Duration,
    container_timeout: Duration,
    table_timeout: Duration,
    pagination_timeout: Duration,
    unit_delay: (Duration, Duration),
    output: OutputConfig,
}

impl CategoryCrawler {
    pub fn from_config(config: &Config, sessions: SessionProvider) -> Self {
        Self {
            sessions,
            list_url: format!(
                "{}/database/list?id=1",
                config.site.base_url.trim_end_matches('/')
            ),
            navigation_timeout: config.timeouts.navigation(),
            container_timeout: config.timeouts.category_container(),
            table_timeout: config.timeouts.table(),
            pagination_timeout: config.timeouts.pagination(),
            unit_delay: (
                Duration::from_millis(config.crawl.unit_delay_ms[0]),
                Duration::from_millis(config.crawl.unit_delay_ms[1]),
            ),
            output: config.output.clone(),
        }
    }

    /// Runs the crawl on one unauthenticated session
    ///
    /// # Errors
    ///
    /// Only when the browser cannot be started at all.
    pub async fn run(&self) -> Result<CategorySummary, SessionError> {
        let mut session = self.sessions.acquire("category crawl").await?;
        let mut summary = CategorySummary::default();

        if let Err(e) = self.crawl_all(session.driver(), &mut summary).await {
            tracing::error!("Category crawl aborted: {}", e);
            summary.aborted = Some(e.to_string());
        }

        self.sessions.release(session).await;
        tracing::info!(
            "Category crawl done: {} categories, {} rows, {} skipped",
            summary.categories,
            summary.rows,
            summary.categories_failed
        );
        Ok(summary)
    }

    async fn crawl_all(&self, driver: &mut dyn PageDriver, summary: &mut CategorySummary) -> DriverResult<()> {
        if let Err(e) = driver.navigate(&self.list_url, self.navigation_timeout).await {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!("Category page load incomplete, continuing: {}", e);
        }
        let container = Condition::Present(Locator::css(PAGE_CONTAINER));
        if let Err(e) = driver.wait_until(&container, self.container_timeout).await {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!("Category page container not found: {}", e);
        }

        let primary_items = category_items("一级");
        let primaries = self.categories(driver, &primary_items).await?;
        if primaries.is_empty() {
            tracing::error!("No primary categories found");
            return Ok(());
        }

        for (i, (position, primary)) in primaries.iter().enumerate() {
            tracing::info!("Primary category {}/{}: {}", i + 1, primaries.len(), primary);

            if let Err(e) = driver.click(&primary_items.nth(*position)).await {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!("[{}] could not select category: {}", primary, e);
                summary.categories_failed += 1;
                continue;
            }
            tokio::time::sleep(pick_delay(self.unit_delay)).await;

            let secondary_items = category_items("二级");
            let secondaries = self.categories(driver, &secondary_items).await?;

            if secondaries.is_empty() {
                tracing::info!("[{}] no secondary categories, reading table directly", primary);
                self.crawl_category(driver, primary, "", summary).await?;
                continue;
            }

            for (j, (position, secondary)) in secondaries.iter().enumerate() {
                tracing::info!(
                    "[{}] secondary category {}/{}: {}",
                    primary,
                    j + 1,
                    secondaries.len(),
                    secondary
                );

                if let Err(e) = driver.click(&secondary_items.nth(*position)).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    tracing::warn!("[{} -> {}] could not select category: {}", primary, secondary, e);
                    summary.categories_failed += 1;
                    continue;
                }
                tokio::time::sleep(pick_delay(self.unit_delay)).await;

                self.crawl_category(driver, primary, secondary, summary).await?;
            }
        }

        Ok(())
    }

    /// Category names with their 1-based position among the filter items
    async fn categories(&self, driver: &mut dyn PageDriver, items: &Locator) -> DriverResult<Vec<(usize, String)>> {
        if let Err(e) = driver
            .wait_until(&Condition::Present(items.clone()), self.container_timeout)
            .await
        {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::debug!("No category items for {}: {}", items, e);
            return Ok(Vec::new());
        }

        let names = match driver.read_texts(items).await {
            Ok(names) => names,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to read categories: {}", e);
                return Ok(Vec::new());
            }
        };

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (i + 1, name.trim().to_string()))
            .filter(|(_, name)| !name.is_empty() && name != ALL_CATEGORIES)
            .collect())
    }

    /// Pages through one category's table and appends its rows
    async fn crawl_category(
        &self,
        driver: &mut dyn PageDriver,
        primary: &str,
        secondary: &str,
        summary: &mut CategorySummary,
    ) -> DriverResult<()> {
        let mut paginator = Paginator::new(
            Locator::css(".btn-next"),
            PageConfirmation::ActiveIndicator(Locator::css(".el-pager li.active")),
            self.pagination_timeout,
        );
        let mut rows = Vec::new();

        loop {
            let present = Condition::Present(Locator::css(TABLE_ROW));
            match driver.wait_until(&present, self.table_timeout).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("[{} -> {}] table not loaded: {}", primary, secondary, e);
                    break;
                }
            }

            let source = match driver.page_source().await {
                Ok(source) => source,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("[{} -> {}] page snapshot failed: {}", primary, secondary, e);
                    break;
                }
            };

            let page_rows = parse_category_rows(&source, primary, secondary);
            if page_rows.is_empty() {
                break;
            }
            tracing::debug!(
                "[{} -> {}] page {}: {} rows",
                primary,
                secondary,
                paginator.current_page(),
                page_rows.len()
            );
            rows.extend(page_rows);

            match paginator.advance(driver).await {
                Advance::Loaded(_) => tokio::time::sleep(pick_delay(self.unit_delay)).await,
                Advance::Finished(Termination::SessionLost(e)) => {
                    return Err(DriverError::SessionLost(e))
                }
                Advance::Finished(_) => break,
            }
        }

        tracing::info!(
            "[{} -> {}] done: {} pages, {} rows",
            primary,
            secondary,
            paginator.current_page(),
            rows.len()
        );

        if rows.is_empty() {
            summary.categories_failed += 1;
            return Ok(());
        }

        match append_csv(&self.output.csv_path(), &rows) {
            Ok(()) => {
                summary.categories += 1;
                summary.rows += rows.len() as u64;
            }
            Err(e) => {
                tracing::error!("[{} -> {}] failed to save rows: {}", primary, secondary, e);
                summary.categories_failed += 1;
            }
        }
        Ok(())
    }
}

/// Reads the composition table rows out of a page snapshot
///
/// Rows with too few cells or an empty name are skipped.
pub fn parse_category_rows(source: &str, primary: &str, secondary: &str) -> Vec<CategoryRow> {
    let doc = Document::parse(source);

    doc.select_table(TABLE_ROW, TABLE_CELL)
        .into_iter()
        .filter(|cells| cells.len() >= ROW_CELLS && !cells[9].trim().is_empty())
        .map(|cells| {
            let cell = |i: usize| cells[i].replace('\n', " ").trim().to_string();
            CategoryRow {
                primary_category: primary.to_string(),
                secondary_category: secondary.to_string(),
                edible_portion_pct: cell(2),
                water_pct: cell(3),
                energy_kcal: cell(4),
                protein_g: cell(5),
                fat_g: cell(6),
                carbohydrate_g: cell(7),
                sodium_mg: cell(8),
                name: cell(9),
            }
        })
        .collect()
}
