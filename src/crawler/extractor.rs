//! Page extractors
//!
//! Extractors pull records out of a loaded page and never fail past their
//! boundary: a missing element leaves a sentinel, a bad page yields no rows.
//! The only error a detail extraction returns is a fatal driver error, which
//! means the session itself is gone.

use crate::config::{CrawlMode, TimeoutConfig};
use crate::crawler::fetcher::{is_http_url, ImageFetcher};
use crate::crawler::lines::{body_lines, MarkerGrammar};
use crate::driver::{Condition, Document, DriverResult, Locator, PageDriver};
use crate::state::{
    DetailRecord, ListRow, Record, MISSING_IMAGE_URL, MISSING_RECIPE, MISSING_TEXT,
    MISSING_UNIT_AMOUNTS,
};
use std::time::Duration;

const TITLE: &str = ".info-title.ellipsis-1";
const MEASURE_UNIT: &str = ".title-tip";
const IMAGE: &str = "span.el-link--inner img";
const UNIT_SELECT_CARET: &str = "div.unit-select .el-select__caret";
const UNIT_OPTIONS: &str = ".el-select-dropdown__list .el-select-dropdown__item";
const RECIPE_INGREDIENTS: &str = ".ingredients span";
const RECIPE_STEPS: &str = ".practice-step";

/// Chart sections by class suffix: 0 macronutrients, 1 vitamins, 2 minerals
fn chart_selector(index: usize) -> String {
    format!(".chart-item.color-class-{} .item-chart-outer", index)
}

/// Extracts the rows of one paginated list page
#[derive(Debug, Clone)]
pub struct ListExtractor {
    grammar: MarkerGrammar,
    container: Locator,
    body: Locator,
    container_timeout: Duration,
    rows_per_page: u64,
}

impl ListExtractor {
    pub fn new(container_timeout: Duration, rows_per_page: u64) -> Self {
        Self {
            grammar: MarkerGrammar::default(),
            container: Locator::css("tbody"),
            body: Locator::css("body"),
            container_timeout,
            rows_per_page,
        }
    }

    pub fn with_grammar(mut self, grammar: MarkerGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Reads every row rendered on `page`
    ///
    /// Returns an empty list, with a logged diagnostic, when the table never
    /// renders or the marker scan finds nothing.
    pub async fn extract_list_page(&self, driver: &mut dyn PageDriver, page: u64) -> Vec<ListRow> {
        if let Err(e) = driver
            .wait_until(&Condition::Present(self.container.clone()), self.container_timeout)
            .await
        {
            tracing::warn!("Page {}: table never rendered: {}", page, e);
            return Vec::new();
        }

        let text = match driver.read_text(&self.body).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!("Page {}: no body text", page);
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Page {}: failed to read body text: {}", page, e);
                return Vec::new();
            }
        };

        self.rows_from_text(&text, page)
    }

    /// Runs the marker scan over already captured page text
    pub fn rows_from_text(&self, text: &str, page: u64) -> Vec<ListRow> {
        let lines = body_lines(text);
        let blocks = match self.grammar.scan(&lines) {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!("Page {}: no rows extracted ({})", page, e);
                return Vec::new();
            }
        };

        if blocks.names.len() != blocks.data.len() / 3 {
            tracing::debug!(
                "Page {}: {} names against {} data values, keeping {} rows",
                page,
                blocks.names.len(),
                blocks.data.len(),
                blocks.row_count()
            );
        }

        let first = page.saturating_sub(1) * self.rows_per_page;
        blocks
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| ListRow {
                sequence_no: first + i as u64 + 1,
                page_no: page,
                name: row.name.to_string(),
                energy: row.values[0].to_string(),
                category: row.values[1].to_string(),
                ingredients: row.values[2].to_string(),
            })
            .collect()
    }
}

/// Which detail page layout to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailKind {
    Dish,
    Ingredient,
}

impl DetailKind {
    /// The detail kind a crawl mode works on, if any
    pub fn for_mode(mode: CrawlMode) -> Option<Self> {
        match mode {
            CrawlMode::DishDetail => Some(Self::Dish),
            CrawlMode::IngredientDetail => Some(Self::Ingredient),
            CrawlMode::DishList | CrawlMode::IngredientCategories => None,
        }
    }

    pub fn detail_url(&self, base_url: &str, id: u64) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Dish => format!("{}/database/dishes/{}", base, id),
            Self::Ingredient => format!("{}/database/ingredient/{}?baseId=1", base, id),
        }
    }

    fn ingredient_selector(&self) -> &'static str {
        match self {
            Self::Dish => ".info-tag .tag-item",
            Self::Ingredient => ".info-desc .desc-item",
        }
    }
}

/// Bounded waits used on a detail page
#[derive(Debug, Clone, Copy)]
pub struct DetailTimeouts {
    pub navigation: Duration,
    pub title: Duration,
    pub short: Duration,
}

impl From<&TimeoutConfig> for DetailTimeouts {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            navigation: timeouts.navigation(),
            title: timeouts.detail_title(),
            short: timeouts.detail_short(),
        }
    }
}

/// Extracts one dish or ingredient detail record
#[derive(Clone)]
pub struct DetailExtractor {
    kind: DetailKind,
    base_url: String,
    timeouts: DetailTimeouts,
    images: Option<ImageFetcher>,
}

impl DetailExtractor {
    pub fn new(
        kind: DetailKind,
        base_url: impl Into<String>,
        timeouts: DetailTimeouts,
        images: Option<ImageFetcher>,
    ) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            timeouts,
            images,
        }
    }

    pub fn kind(&self) -> DetailKind {
        self.kind
    }

    /// Loads the detail page of `id` and reads it
    ///
    /// Each step (title, image, unit selector, page snapshot) fails on its
    /// own; the record always comes back with sentinels where a step failed.
    ///
    /// # Errors
    ///
    /// Only fatal driver errors, which end the batch.
    pub async fn extract_detail(&self, driver: &mut dyn PageDriver, id: u64) -> DriverResult<Record> {
        let url = self.kind.detail_url(&self.base_url, id);
        tracing::debug!("Unit {}: loading {}", id, url);

        if tolerate(driver.navigate(&url, self.timeouts.navigation).await, id, "page load")?.is_none() {
            tracing::warn!("Unit {}: page load incomplete, continuing", id);
        }

        let title = Condition::Present(Locator::css(TITLE));
        tolerate(driver.wait_until(&title, self.timeouts.title).await, id, "title")?;

        let (image_url, image_path) = self.read_image(driver, id).await?;
        self.expand_unit_selector(driver, id).await?;

        let source = tolerate(driver.page_source().await, id, "page snapshot")?.unwrap_or_default();
        Ok(Record::Detail(build_detail_record(
            self.kind, id, &source, image_url, image_path,
        )))
    }

    async fn read_image(&self, driver: &mut dyn PageDriver, id: u64) -> DriverResult<(String, String)> {
        let image = Locator::css(IMAGE);
        let present = driver
            .wait_until(&Condition::Present(image.clone()), self.timeouts.short)
            .await;
        if tolerate(present, id, "image")?.is_none() {
            return Ok((MISSING_IMAGE_URL.to_string(), String::new()));
        }

        let src = tolerate(driver.read_attribute(&image, "src").await, id, "image src")?
            .flatten()
            .filter(|src| !src.trim().is_empty());
        let Some(src) = src else {
            return Ok((MISSING_IMAGE_URL.to_string(), String::new()));
        };

        let mut saved = String::new();
        if let Some(images) = &self.images {
            if is_http_url(&src) {
                match images.download(&src, id).await {
                    Ok(path) => saved = path.display().to_string(),
                    Err(e) => tracing::warn!("Unit {}: image not saved: {}", id, e),
                }
            }
        }

        Ok((src, saved))
    }

    async fn expand_unit_selector(&self, driver: &mut dyn PageDriver, id: u64) -> DriverResult<()> {
        let caret = Locator::css(UNIT_SELECT_CARET);
        let present = driver
            .wait_until(&Condition::Present(caret.clone()), self.timeouts.short)
            .await;
        if tolerate(present, id, "unit selector")?.is_none() {
            return Ok(());
        }
        if tolerate(driver.click(&caret).await, id, "unit selector click")?.is_none() {
            return Ok(());
        }

        let options = Condition::Present(Locator::css(UNIT_OPTIONS));
        tolerate(driver.wait_until(&options, self.timeouts.short).await, id, "unit options")?;
        Ok(())
    }
}

/// Passes fatal errors through and degrades everything else to `None`
fn tolerate<T>(result: DriverResult<T>, id: u64, step: &str) -> DriverResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!("Unit {}: {} skipped: {}", id, step, e);
            Ok(None)
        }
    }
}

/// Builds a detail record from a page snapshot
pub fn build_detail_record(
    kind: DetailKind,
    id: u64,
    source: &str,
    image_url: String,
    image_path: String,
) -> DetailRecord {
    let doc = Document::parse(source);

    let recipe = match kind {
        DetailKind::Dish => Some(recipe_text(&doc)),
        DetailKind::Ingredient => None,
    };

    let unit_amounts = doc.select_many(UNIT_OPTIONS).join("\n");

    DetailRecord {
        id,
        name: doc.text_or(TITLE, MISSING_TEXT),
        ingredients: join_items(doc.select_many(kind.ingredient_selector())),
        measure_unit: doc.text_or(MEASURE_UNIT, MISSING_TEXT),
        image_url,
        image_path,
        recipe,
        macronutrients: join_items(doc.select_many(&chart_selector(0))),
        vitamins: join_items(doc.select_many(&chart_selector(1))),
        minerals: join_items(doc.select_many(&chart_selector(2))),
        unit_amounts: if unit_amounts.is_empty() {
            MISSING_UNIT_AMOUNTS.to_string()
        } else {
            unit_amounts
        },
    }
}

/// Ingredient line followed by the preparation steps
fn recipe_text(doc: &Document) -> String {
    let mut lines: Vec<String> = doc.select_one(RECIPE_INGREDIENTS).into_iter().collect();
    lines.extend(doc.select_many(RECIPE_STEPS));

    if lines.is_empty() {
        MISSING_RECIPE.to_string()
    } else {
        lines.join("\n")
    }
}

/// One item per line, inner line breaks flattened
fn join_items(items: Vec<String>) -> String {
    items
        .iter()
        .map(|item| item.replace('\n', " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
