//! Page driver abstraction
//!
//! This module defines the browser capability the harvester consumes:
//! - `PageDriver`: navigate, query, click, type and read a live page
//! - `DriverFactory`: launches a fresh driver for one session
//! - `Locator` / `Condition`: what to look for and what to wait on
//! - `Document`: read-only queries over a captured page source
//!
//! The Chrome implementation lives in `chrome`; tests plug in scripted drivers.

mod chrome;
mod document;

pub use chrome::{ChromeDriver, ChromeLauncher};
pub use document::Document;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between two evaluations of a wait condition
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by a page driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),
}

impl DriverError {
    /// Returns true if the session can no longer be used at all
    ///
    /// Every other error is local to one step and is degraded by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::SessionLost(_))
    }

    /// Returns true if this error is an expired bounded wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// How to find an element on the live page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Matches an anchor whose normalized text equals `text`
    pub fn link_text(text: &str) -> Self {
        Self::XPath(format!("//a[normalize-space(.)={}]", xpath_literal(text)))
    }

    /// Narrows an XPath locator to its `index`-th match (1-based)
    ///
    /// CSS locators are returned unchanged; callers index CSS through
    /// `read_texts` instead.
    pub fn nth(&self, index: usize) -> Self {
        match self {
            Self::XPath(expr) => Self::XPath(format!("({})[{}]", expr, index)),
            Self::Css(_) => self.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css `{}`", selector),
            Self::XPath(expr) => write!(f, "xpath `{}`", expr),
        }
    }
}

/// Quotes a string for use inside an XPath expression
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// A predicate over the live page, evaluated by `wait_until`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// An element matching the locator exists
    Present(Locator),

    /// The first matching element's trimmed text equals the value
    TextEquals(Locator, String),

    /// The raw page source contains the value
    SourceContains(String),

    /// The current location, lowercased, does not contain the value
    LocationExcludes(String),

    /// `document.readyState` is `complete`
    DocumentReady,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(locator) => write!(f, "{} to be present", locator),
            Self::TextEquals(locator, text) => write!(f, "{} to read '{}'", locator, text),
            Self::SourceContains(text) => write!(f, "page source to contain '{}'", text),
            Self::LocationExcludes(text) => write!(f, "location to leave '{}'", text),
            Self::DocumentReady => write!(f, "document ready state"),
        }
    }
}

/// A single browser page under automation
///
/// A driver is owned by exactly one session and is never shared between
/// tasks; all methods take `&mut self`.
#[async_trait]
pub trait PageDriver: Send {
    /// Loads `url`, giving up after `timeout`
    ///
    /// A timeout leaves the page in whatever state it reached.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Returns true if at least one element matches
    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool>;

    /// Clicks the first matching element
    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Types text into the first matching element
    async fn type_text(&mut self, locator: &Locator, text: &str) -> DriverResult<()>;

    /// Rendered text of the first matching element, `None` if absent
    async fn read_text(&mut self, locator: &Locator) -> DriverResult<Option<String>>;

    /// Rendered text of every matching element, in document order
    ///
    /// Yields exactly one entry per match, an empty string for elements
    /// without text, so positions line up with `Locator::nth`.
    async fn read_texts(&mut self, locator: &Locator) -> DriverResult<Vec<String>>;

    /// Attribute value of the first matching element
    async fn read_attribute(&mut self, locator: &Locator, name: &str)
        -> DriverResult<Option<String>>;

    /// URL currently shown by the page
    async fn current_location(&mut self) -> DriverResult<String>;

    /// Serialized DOM of the current page
    async fn page_source(&mut self) -> DriverResult<String>;

    /// Returns true once the document finished loading
    async fn document_ready(&mut self) -> DriverResult<bool>;

    /// Shuts the browser down
    async fn close(&mut self) -> DriverResult<()>;

    /// Evaluates a condition once
    async fn check(&mut self, condition: &Condition) -> DriverResult<bool> {
        match condition {
            Condition::Present(locator) => self.exists(locator).await,
            Condition::TextEquals(locator, expected) => Ok(self
                .read_text(locator)
                .await?
                .map(|text| text.trim() == expected.as_str())
                .unwrap_or(false)),
            Condition::SourceContains(needle) => {
                Ok(self.page_source().await?.contains(needle.as_str()))
            }
            Condition::LocationExcludes(fragment) => Ok(!self
                .current_location()
                .await?
                .to_lowercase()
                .contains(&fragment.to_lowercase())),
            Condition::DocumentReady => self.document_ready().await,
        }
    }

    /// Polls `condition` until it holds or `timeout` expires
    ///
    /// Non-fatal errors during a poll count as "not yet"; fatal ones end the
    /// wait immediately.
    async fn wait_until(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.check(condition).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::trace!("Poll for {} failed: {}", condition, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout {
                    what: condition.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Launches fresh page drivers, one per session
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>>;
}
