use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Nutri-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which part of the site a run harvests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CrawlMode {
    /// Paginated dish list, extracted from the flattened page text
    #[serde(rename = "dish-list")]
    DishList,

    /// Ingredient table, walked category by category
    #[serde(rename = "ingredient-categories")]
    IngredientCategories,

    /// One detail page per dish ID
    #[serde(rename = "dish-detail")]
    DishDetail,

    /// One detail page per ingredient ID
    #[serde(rename = "ingredient-detail")]
    IngredientDetail,
}

impl CrawlMode {
    /// Returns true if this mode is driven by a `[start, end]` unit range
    pub fn uses_unit_range(&self) -> bool {
        !matches!(self, Self::IngredientCategories)
    }

    /// Returns true if this mode produces JSON detail records
    pub fn is_detail(&self) -> bool {
        matches!(self, Self::DishDetail | Self::IngredientDetail)
    }

    /// Name as written in the configuration file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DishList => "dish-list",
            Self::IngredientCategories => "ingredient-categories",
            Self::DishDetail => "dish-detail",
            Self::IngredientDetail => "ingredient-detail",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crawl scope and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    pub mode: CrawlMode,

    /// First unit (page number or entity ID), inclusive
    #[serde(default = "default_start")]
    pub start: u64,

    /// Last unit, inclusive
    #[serde(default = "default_start")]
    pub end: u64,

    /// Number of units handled by one session
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Number of batches processed at the same time
    #[serde(rename = "max-concurrency", default = "default_concurrency")]
    pub max_concurrency: usize,

    /// Uniform random pause between units, `[min, max]` milliseconds
    #[serde(rename = "unit-delay-ms", default = "default_unit_delay")]
    pub unit_delay_ms: [u64; 2],

    /// Rows shown on one list page, used for sequence numbering
    #[serde(rename = "rows-per-page", default = "default_rows_per_page")]
    pub rows_per_page: u64,
}

impl CrawlConfig {
    /// Number of units in the configured range
    pub fn unit_count(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }
}

/// Target site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Login credentials for authenticated flows
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Path to a Chrome/Chromium binary; auto-detected when absent
    #[serde(default)]
    pub executable: Option<PathBuf>,

    #[serde(rename = "extra-args", default = "default_extra_args")]
    pub extra_args: Vec<String>,

    #[serde(rename = "window-width", default = "default_window_width")]
    pub window_width: u32,

    #[serde(rename = "window-height", default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: default_user_agent(),
            executable: None,
            extra_args: default_extra_args(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

/// Bounded waits, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_navigation_ms")]
    pub navigation: u64,

    #[serde(rename = "detail-title", default = "default_detail_title_ms")]
    pub detail_title: u64,

    #[serde(rename = "detail-short", default = "default_detail_short_ms")]
    pub detail_short: u64,

    #[serde(rename = "list-container", default = "default_long_ms")]
    pub list_container: u64,

    #[serde(default = "default_long_ms")]
    pub pagination: u64,

    #[serde(rename = "login-ready", default = "default_long_ms")]
    pub login_ready: u64,

    #[serde(rename = "login-step", default = "default_login_step_ms")]
    pub login_step: u64,

    #[serde(rename = "login-confirm", default = "default_long_ms")]
    pub login_confirm: u64,

    #[serde(rename = "category-container", default = "default_category_container_ms")]
    pub category_container: u64,

    #[serde(default = "default_table_ms")]
    pub table: u64,
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation)
    }

    pub fn detail_title(&self) -> Duration {
        Duration::from_millis(self.detail_title)
    }

    pub fn detail_short(&self) -> Duration {
        Duration::from_millis(self.detail_short)
    }

    pub fn list_container(&self) -> Duration {
        Duration::from_millis(self.list_container)
    }

    pub fn pagination(&self) -> Duration {
        Duration::from_millis(self.pagination)
    }

    pub fn login_ready(&self) -> Duration {
        Duration::from_millis(self.login_ready)
    }

    pub fn login_step(&self) -> Duration {
        Duration::from_millis(self.login_step)
    }

    pub fn login_confirm(&self) -> Duration {
        Duration::from_millis(self.login_confirm)
    }

    pub fn category_container(&self) -> Duration {
        Duration::from_millis(self.category_container)
    }

    pub fn table(&self) -> Duration {
        Duration::from_millis(self.table)
    }

    /// All values paired with their key, for validation
    pub(crate) fn entries(&self) -> [(&'static str, u64); 10] {
        [
            ("navigation", self.navigation),
            ("detail-title", self.detail_title),
            ("detail-short", self.detail_short),
            ("list-container", self.list_container),
            ("pagination", self.pagination),
            ("login-ready", self.login_ready),
            ("login-step", self.login_step),
            ("login-confirm", self.login_confirm),
            ("category-container", self.category_container),
            ("table", self.table),
        ]
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: default_navigation_ms(),
            detail_title: default_detail_title_ms(),
            detail_short: default_detail_short_ms(),
            list_container: default_long_ms(),
            pagination: default_long_ms(),
            login_ready: default_long_ms(),
            login_step: default_login_step_ms(),
            login_confirm: default_long_ms(),
            category_container: default_category_container_ms(),
            table: default_table_ms(),
        }
    }
}

/// Fixed-count, fixed-delay retry budgets
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "login-attempts", default = "default_login_attempts")]
    pub login_attempts: u32,

    #[serde(rename = "login-delay-ms", default = "default_login_delay_ms")]
    pub login_delay_ms: u64,

    #[serde(rename = "fetch-attempts", default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    #[serde(rename = "fetch-delay-ms", default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,

    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl RetryConfig {
    pub fn login_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.login_attempts,
            delay: Duration::from_millis(self.login_delay_ms),
        }
    }

    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts,
            delay: Duration::from_millis(self.fetch_delay_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            login_attempts: default_login_attempts(),
            login_delay_ms: default_login_delay_ms(),
            fetch_attempts: default_fetch_attempts(),
            fetch_delay_ms: default_fetch_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// A fixed number of attempts separated by a fixed pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Output file locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    #[serde(rename = "progress-file", default = "default_progress_file")]
    pub progress_file: String,

    #[serde(rename = "complete-file", default = "default_complete_file")]
    pub complete_file: String,

    #[serde(rename = "image-dir", default = "default_image_dir")]
    pub image_dir: String,

    #[serde(rename = "csv-file", default = "default_csv_file")]
    pub csv_file: String,

    #[serde(rename = "batch-file-prefix", default = "default_batch_prefix")]
    pub batch_file_prefix: String,

    #[serde(rename = "summary-file", default = "default_summary_file")]
    pub summary_file: String,
}

impl OutputConfig {
    pub fn progress_path(&self) -> PathBuf {
        self.directory.join(&self.progress_file)
    }

    pub fn complete_path(&self) -> PathBuf {
        self.directory.join(&self.complete_file)
    }

    pub fn image_path(&self) -> PathBuf {
        self.directory.join(&self.image_dir)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.directory.join(&self.csv_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.directory.join(&self.summary_file)
    }

    /// Path of the snapshot file for one list-mode batch
    pub fn batch_path(&self, batch_number: u32) -> PathBuf {
        self.directory
            .join(format!("{}{}.csv", self.batch_file_prefix, batch_number))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            progress_file: default_progress_file(),
            complete_file: default_complete_file(),
            image_dir: default_image_dir(),
            csv_file: default_csv_file(),
            batch_file_prefix: default_batch_prefix(),
            summary_file: default_summary_file(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_start() -> u64 {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_unit_delay() -> [u64; 2] {
    [300, 1500]
}

fn default_rows_per_page() -> u64 {
    10
}

fn default_base_url() -> String {
    "https://nutridata.cn".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_extra_args() -> Vec<String> {
    vec![
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ]
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_navigation_ms() -> u64 {
    10_000
}

fn default_detail_title_ms() -> u64 {
    3_000
}

fn default_detail_short_ms() -> u64 {
    2_000
}

fn default_long_ms() -> u64 {
    10_000
}

fn default_login_step_ms() -> u64 {
    5_000
}

fn default_category_container_ms() -> u64 {
    30_000
}

fn default_table_ms() -> u64 {
    15_000
}

fn default_login_attempts() -> u32 {
    3
}

fn default_login_delay_ms() -> u64 {
    2_000
}

fn default_fetch_attempts() -> u32 {
    2
}

fn default_fetch_delay_ms() -> u64 {
    1_000
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_progress_file() -> String {
    "progress.json".to_string()
}

fn default_complete_file() -> String {
    "complete.json".to_string()
}

fn default_image_dir() -> String {
    "images".to_string()
}

fn default_csv_file() -> String {
    "records.csv".to_string()
}

fn default_batch_prefix() -> String {
    "batch".to_string()
}

fn default_summary_file() -> String {
    "summary.md".to_string()
}
