//! Scripted in-memory site for driving the harvester without a browser
//!
//! `FakeSite` holds canned page sources keyed by URL, a paginated list view,
//! the ingredient category view and failure injections. Every launched
//! `FakeDriver` is one "browser" over that site.

use async_trait::async_trait;
use nutri_harvest::config::{parse_config, Config};
use nutri_harvest::crawler::{ByteFetcher, FetchError};
use nutri_harvest::driver::{DriverError, DriverFactory, DriverResult, Locator, PageDriver};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://nutridata.test";

pub fn login_url() -> String {
    format!("{}/login", BASE_URL)
}

pub fn list_url() -> String {
    format!("{}/database/list?id=2", BASE_URL)
}

pub fn category_url() -> String {
    format!("{}/database/list?id=1", BASE_URL)
}

pub fn dish_url(id: u64) -> String {
    format!("{}/database/dishes/{}", BASE_URL, id)
}

const LOGIN_PAGE: &str = r#"<html><body>
  <a>密码登录</a>
  <input placeholder="请输入用户名或手机号">
  <input placeholder="请输入密码">
  <button class="el-button primary-btn"><span>登 录</span></button>
</body></html>"#;

const BLANK_PAGE: &str = "<html><body></body></html>";

const LIST_FOOTER: &str = "0: 估计0值，理论上为0值或不存在，或测定后为0";

/// A dish detail page with a title, one tag, one chart value and an image
pub fn dish_page(id: u64) -> String {
    format!(
        r#"<html><body>
  <div class="info-title ellipsis-1">Dish {id}</div>
  <div class="info-tag"><span class="tag-item">Tofu</span></div>
  <p class="title-tip">per 100g</p>
  <span class="el-link--inner"><img src="https://img.nutridata.test/dish/{id}.png"></span>
  <div class="chart-item color-class-0"><div class="item-chart-outer">Energy {id}kcal</div></div>
</body></html>"#,
        id = id
    )
}

/// How the last list page presents its "next" control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    /// Rendered with the `disabled` class and attribute
    Disabled,

    /// Not rendered at all
    Missing,

    /// Rendered and clickable, but clicking does nothing
    Stuck,
}

/// One row of a list page: name, energy, category, ingredients
pub type ListEntry = (String, String, String, String);

/// Rows for page `page`, named `Dish <page>-<row>`
pub fn list_entries(page: u64, rows: u64) -> Vec<ListEntry> {
    (1..=rows)
        .map(|row| {
            (
                format!("Dish {}-{}", page, row),
                format!("{}{}5", page, row),
                "Staple".to_string(),
                "Rice".to_string(),
            )
        })
        .collect()
}

fn list_page(page: u64, entries: &[ListEntry], last: bool, end: ListEnd) -> String {
    let mut text = String::from("Dish database\nMajor\n");
    for (_, energy, category, ingredients) in entries {
        text.push_str(&format!("{}\n{}\n{}\n", energy, category, ingredients));
    }
    text.push_str("Name\n");
    for (name, _, _, _) in entries {
        text.push_str(&format!("{}\n", name));
    }
    text.push_str(LIST_FOOTER);

    let button = match (last, end) {
        (true, ListEnd::Disabled) => {
            r#"<button class="btn-next disabled" disabled="disabled"></button>"#
        }
        (true, ListEnd::Missing) => "",
        _ => r#"<button class="btn-next"></button>"#,
    };

    format!(
        r#"<html><body><div class="list">
{text}
</div><table><tbody><tr><td></td></tr></tbody></table>
<ul class="el-pager"><li class="number active">{page}</li></ul>
{button}
</body></html>"#,
        text = text,
        page = page,
        button = button
    )
}

/// One composition table of the category view, as pages of ingredient names
#[derive(Debug, Clone)]
pub struct CategoryTable {
    pub primary: String,
    pub secondary: Option<String>,
    pub pages: Vec<Vec<String>>,
}

pub fn category_table(primary: &str, secondary: Option<&str>, pages: &[&[&str]]) -> CategoryTable {
    CategoryTable {
        primary: primary.to_string(),
        secondary: secondary.map(str::to_string),
        pages: pages
            .iter()
            .map(|names| names.iter().map(|n| n.to_string()).collect())
            .collect(),
    }
}

const ALL_ITEM: &str = "全部";

fn category_page(table: Option<&CategoryTable>, page: usize) -> String {
    let names = table.and_then(|t| t.pages.get(page));
    let rows: String = names
        .map(|names| {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let cells = [
                        (i + 1).to_string(),
                        format!("C{:03}", i + 1),
                        "100".to_string(),
                        "80.5".to_string(),
                        "52".to_string(),
                        "0.3".to_string(),
                        "0.2".to_string(),
                        "13.8".to_string(),
                        "1.6".to_string(),
                        name.clone(),
                    ];
                    let tds: String = cells
                        .iter()
                        .map(|c| format!(r#"<td class="el-table__cell">{}</td>"#, c))
                        .collect();
                    format!(r#"<tr class="el-table__row">{}</tr>"#, tds)
                })
                .collect()
        })
        .unwrap_or_default();

    let pager = match (table, names) {
        (Some(table), Some(_)) => {
            let button = if page + 1 < table.pages.len() {
                r#"<button class="btn-next"></button>"#
            } else {
                r#"<button class="btn-next disabled" disabled="disabled"></button>"#
            };
            format!(
                r#"<ul class="el-pager"><li class="number active">{}</li></ul>{}"#,
                page + 1,
                button
            )
        }
        _ => String::new(),
    };

    format!(
        r#"<html><body><div class="database-warp-container">
<table class="el-table__body"><tbody>{rows}</tbody></table>
{pager}
</div></body></html>"#,
        rows = rows,
        pager = pager
    )
}

/// Which filter row of the category view an XPath addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterLevel {
    Primary,
    Secondary,
}

/// The filter level and the optional 1-based `(expr)[n]` index of an XPath
fn filter_target(expr: &str) -> Option<(FilterLevel, Option<usize>)> {
    let level = if expr.contains("一级分类") {
        FilterLevel::Primary
    } else if expr.contains("二级分类") {
        FilterLevel::Secondary
    } else {
        return None;
    };
    let index = expr
        .strip_prefix('(')
        .and_then(|rest| rest.rfind(")[").map(|at| &rest[at + 2..]))
        .and_then(|tail| tail.strip_suffix(']'))
        .and_then(|n| n.parse().ok());
    Some((level, index))
}

/// The site every fake browser talks to
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    list_pages: Vec<String>,
    primary_filter: Vec<String>,
    category_tables: Vec<CategoryTable>,
    failing_launches: HashSet<usize>,
    failing_logins: HashSet<usize>,
    fatal_urls: HashSet<String>,
    panicking_urls: HashSet<String>,
    launches: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
    visited: Mutex<Vec<(usize, String)>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dishes(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        for id in ids {
            self.pages.insert(dish_url(id), dish_page(id));
        }
        self
    }

    /// Installs the list view, one `Vec<ListEntry>` per page
    pub fn with_list(mut self, pages: Vec<Vec<ListEntry>>, end: ListEnd) -> Self {
        let count = pages.len();
        self.list_pages = pages
            .iter()
            .enumerate()
            .map(|(i, entries)| list_page(i as u64 + 1, entries, i + 1 == count, end))
            .collect();
        self
    }

    /// Installs the category view
    ///
    /// `primary_filter` is the exact text of every primary filter item in
    /// page order, including "全部" and any items without text.
    pub fn with_categories(mut self, primary_filter: &[&str], tables: Vec<CategoryTable>) -> Self {
        self.primary_filter = primary_filter.iter().map(|s| s.to_string()).collect();
        self.category_tables = tables;
        self
    }

    /// The `n`-th launch (1-based) fails
    pub fn failing_launch(mut self, n: usize) -> Self {
        self.failing_launches.insert(n);
        self
    }

    /// Logins on the `n`-th launched browser never succeed
    pub fn failing_login(mut self, n: usize) -> Self {
        self.failing_logins.insert(n);
        self
    }

    /// Loading `url` kills the browser
    pub fn fatal_at(mut self, url: String) -> Self {
        self.fatal_urls.insert(url);
        self
    }

    /// Loading `url` panics inside the driver
    pub fn panic_at(mut self, url: String) -> Self {
        self.panicking_urls.insert(url);
        self
    }

    pub fn launcher(self: &Arc<Self>) -> Arc<dyn DriverFactory> {
        Arc::new(FakeLauncher {
            site: Arc::clone(self),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Most browsers that were open at the same time
    pub fn peak_sessions(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in call order
    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    /// URLs navigated to by the `n`-th launched browser
    pub fn visited_by(&self, launch: usize) -> Vec<String> {
        self.visited
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == launch)
            .map(|(_, url)| url.clone())
            .collect()
    }

    fn secondaries_of(&self, primary: &str) -> Vec<String> {
        self.category_tables
            .iter()
            .filter(|t| t.primary == primary)
            .filter_map(|t| t.secondary.clone())
            .collect()
    }
}

struct FakeLauncher {
    site: Arc<FakeSite>,
}

#[async_trait]
impl DriverFactory for FakeLauncher {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        let launch = self.site.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.site.failing_launches.contains(&launch) {
            return Err(DriverError::Launch(format!("launch {} refused", launch)));
        }
        let live = self.site.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeDriver {
            site: Arc::clone(&self.site),
            launch,
            location: "about:blank".to_string(),
            list_page: None,
            category: None,
            closed: false,
        }))
    }
}

/// Filter selection and table page of the category view
#[derive(Debug, Clone, Default)]
struct CategoryView {
    primary: Option<String>,
    secondary: Option<String>,
    page: usize,
}

/// One fake browser with a single page
pub struct FakeDriver {
    site: Arc<FakeSite>,
    launch: usize,
    location: String,
    list_page: Option<usize>,
    category: Option<CategoryView>,
    closed: bool,
}

impl FakeDriver {
    fn source(&self) -> String {
        if let Some(index) = self.list_page {
            return self.site.list_pages[index].clone();
        }
        if let Some(view) = &self.category {
            return category_page(self.current_table(view), view.page);
        }
        if self.location == login_url() {
            return LOGIN_PAGE.to_string();
        }
        self.site
            .pages
            .get(&self.location)
            .cloned()
            .unwrap_or_else(|| BLANK_PAGE.to_string())
    }

    fn on_login_page(&self) -> bool {
        self.location == login_url()
    }

    fn current_table(&self, view: &CategoryView) -> Option<&CategoryTable> {
        let primary = view.primary.as_ref()?;
        self.site
            .category_tables
            .iter()
            .find(|t| &t.primary == primary && t.secondary == view.secondary)
    }

    /// Texts of the filter items on one level of the category view
    fn filter_items(&self, level: FilterLevel) -> Vec<String> {
        let Some(view) = &self.category else {
            return Vec::new();
        };
        match level {
            FilterLevel::Primary => self.site.primary_filter.clone(),
            FilterLevel::Secondary => {
                let Some(primary) = &view.primary else {
                    return Vec::new();
                };
                let secondaries = self.site.secondaries_of(primary);
                if secondaries.is_empty() {
                    return Vec::new();
                }
                std::iter::once(ALL_ITEM.to_string())
                    .chain(secondaries)
                    .collect()
            }
        }
    }

    fn xpath_texts(&self, expr: &str) -> Vec<String> {
        match filter_target(expr) {
            Some((level, None)) => self.filter_items(level),
            Some((level, Some(n))) => self
                .filter_items(level)
                .into_iter()
                .nth(n.wrapping_sub(1))
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    }

    fn select_filter(&mut self, level: FilterLevel, n: usize) {
        let Some(name) = self.filter_items(level).into_iter().nth(n.wrapping_sub(1)) else {
            return;
        };
        if let Some(view) = self.category.as_mut() {
            match level {
                FilterLevel::Primary => {
                    view.primary = Some(name);
                    view.secondary = None;
                }
                FilterLevel::Secondary => view.secondary = Some(name),
            }
            view.page = 0;
        }
    }

    /// Texts of every CSS match in the current source
    fn css_texts(&self, selector: &str) -> Vec<String> {
        let html = Html::parse_document(&self.source());
        match Selector::parse(selector) {
            Ok(selector) => html
                .select(&selector)
                .map(|element| element.text().collect::<String>())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn css_attribute(&self, selector: &str, name: &str) -> Option<String> {
        let html = Html::parse_document(&self.source());
        let selector = Selector::parse(selector).ok()?;
        let element = html.select(&selector).next()?;
        element.value().attr(name).map(str::to_string)
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(selector) => !self.css_texts(selector).is_empty(),
            Locator::XPath(expr) => self.on_login_page() || !self.xpath_texts(expr).is_empty(),
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.site
            .visited
            .lock()
            .unwrap()
            .push((self.launch, url.to_string()));
        if self.site.panicking_urls.contains(url) {
            panic!("fake browser crashed loading {}", url);
        }
        if self.site.fatal_urls.contains(url) {
            return Err(DriverError::SessionLost(format!("browser died loading {}", url)));
        }
        self.location = url.to_string();
        self.list_page = (url == list_url() && !self.site.list_pages.is_empty()).then_some(0);
        self.category = (url == category_url() && !self.site.primary_filter.is_empty())
            .then(CategoryView::default);
        Ok(())
    }

    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool> {
        Ok(self.matches(locator))
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        if !self.matches(locator) {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }

        if let Locator::XPath(expr) = locator {
            if self.on_login_page() && expr.contains("primary-btn") {
                if !self.site.failing_logins.contains(&self.launch) {
                    self.location = format!("{}/home", BASE_URL);
                }
                return Ok(());
            }
            if let Some((level, Some(n))) = filter_target(expr) {
                self.select_filter(level, n);
                return Ok(());
            }
        }

        if let (Locator::Css(selector), Some(view)) = (locator, self.category.clone()) {
            let pages = self.current_table(&view).map(|t| t.pages.len()).unwrap_or(0);
            if selector.contains("btn-next") && view.page + 1 < pages {
                self.category = Some(CategoryView {
                    page: view.page + 1,
                    ..view
                });
            }
            return Ok(());
        }

        if let (Locator::Css(selector), Some(index)) = (locator, self.list_page) {
            if selector.contains("btn-next") && index + 1 < self.site.list_pages.len() {
                self.list_page = Some(index + 1);
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, _text: &str) -> DriverResult<()> {
        if self.matches(locator) {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(locator.to_string()))
        }
    }

    async fn read_text(&mut self, locator: &Locator) -> DriverResult<Option<String>> {
        Ok(match locator {
            Locator::Css(selector) => self.css_texts(selector).into_iter().next(),
            Locator::XPath(expr) => self.xpath_texts(expr).into_iter().next(),
        })
    }

    async fn read_texts(&mut self, locator: &Locator) -> DriverResult<Vec<String>> {
        Ok(match locator {
            Locator::Css(selector) => self.css_texts(selector),
            Locator::XPath(expr) => self.xpath_texts(expr),
        })
    }

    async fn read_attribute(
        &mut self,
        locator: &Locator,
        name: &str,
    ) -> DriverResult<Option<String>> {
        Ok(match locator {
            Locator::Css(selector) => self.css_attribute(selector, name),
            Locator::XPath(_) => None,
        })
    }

    async fn current_location(&mut self) -> DriverResult<String> {
        Ok(self.location.clone())
    }

    async fn page_source(&mut self) -> DriverResult<String> {
        Ok(self.source())
    }

    async fn document_ready(&mut self) -> DriverResult<bool> {
        Ok(true)
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.site.closes.fetch_add(1, Ordering::SeqCst);
        if !self.closed {
            self.closed = true;
            self.site.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Image fetcher that always returns the same few bytes
pub struct FakeImages;

#[async_trait]
impl ByteFetcher for FakeImages {
    async fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(b"\x89PNG fake".to_vec())
    }
}

pub fn fake_images() -> Arc<dyn ByteFetcher> {
    Arc::new(FakeImages)
}

/// A validated configuration with short timeouts and no pacing
pub fn test_config(
    mode: &str,
    start: u64,
    end: u64,
    batch_size: usize,
    max_concurrency: usize,
    output_dir: &Path,
    with_credentials: bool,
) -> Config {
    let credentials = if with_credentials {
        "[credentials]\nusername = \"tester\"\npassword = \"secret\"\n"
    } else {
        ""
    };

    let toml = format!(
        r#"
[crawl]
mode = "{mode}"
start = {start}
end = {end}
batch-size = {batch_size}
max-concurrency = {max_concurrency}
unit-delay-ms = [0, 0]

[site]
base-url = "{base}"

{credentials}
[timeouts]
navigation = 1000
detail-title = 50
detail-short = 20
list-container = 100
pagination = 100
login-ready = 50
login-step = 50
login-confirm = 50
category-container = 50
table = 50

[retry]
login-attempts = 2
login-delay-ms = 1
fetch-attempts = 1
fetch-delay-ms = 1

[output]
directory = '{dir}'
"#,
        mode = mode,
        start = start,
        end = end,
        batch_size = batch_size,
        max_concurrency = max_concurrency,
        base = BASE_URL,
        credentials = credentials,
        dir = output_dir.display()
    );

    parse_config(&toml).expect("test config should be valid")
}
