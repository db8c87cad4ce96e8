//! "Next page" state machine for list and table views
//!
//! ```text
//! Loaded(n) -> ClickNext -> WaitForPageIndexChange(n+1) -> Loaded(n+1)
//!                  |                    |
//!                  v                    v
//!   NoNextButton | NextButtonDisabled   WaitTimeout
//! ```
//!
//! The page counter only moves once the new page is confirmed rendered.
//! `advance` never returns an error; every way out is a `Termination`.

use crate::driver::{Condition, DriverError, Locator, PageDriver};
use std::fmt;
use std::time::Duration;

/// How a page transition is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageConfirmation {
    /// The expected page number appears anywhere in the page source
    SourceContains,

    /// The active-page indicator reads the expected page number
    ActiveIndicator(Locator),
}

impl PageConfirmation {
    fn condition(&self, page: u64) -> Condition {
        match self {
            Self::SourceContains => Condition::SourceContains(page.to_string()),
            Self::ActiveIndicator(locator) => Condition::TextEquals(locator.clone(), page.to_string()),
        }
    }
}

/// Why pagination stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// No "next" control rendered within the wait
    NoNextButton,

    /// The "next" control is disabled: normal end of data
    NextButtonDisabled,

    /// The next page was never confirmed
    WaitTimeout,

    /// The click on "next" failed
    ClickFailed(String),

    /// The browser went away
    SessionLost(String),
}

impl Termination {
    /// Returns true for the end-of-data terminations
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::NoNextButton | Self::NextButtonDisabled)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNextButton => write!(f, "no next button"),
            Self::NextButtonDisabled => write!(f, "next button disabled"),
            Self::WaitTimeout => write!(f, "timed out waiting for next page"),
            Self::ClickFailed(e) => write!(f, "next button click failed: {}", e),
            Self::SessionLost(e) => write!(f, "session lost: {}", e),
        }
    }
}

/// Outcome of one `advance` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The given page is now rendered
    Loaded(u64),

    /// Pagination is over
    Finished(Termination),
}

/// Drives the "next page" control of one paginated view
#[derive(Debug, Clone)]
pub struct Paginator {
    next_button: Locator,
    confirmation: PageConfirmation,
    timeout: Duration,
    page: u64,
}

impl Paginator {
    /// Creates a paginator positioned on page 1
    pub fn new(next_button: Locator, confirmation: PageConfirmation, timeout: Duration) -> Self {
        Self {
            next_button,
            confirmation,
            timeout,
            page: 1,
        }
    }

    /// The page currently confirmed as rendered
    pub fn current_page(&self) -> u64 {
        self.page
    }

    /// Moves to the next page
    pub async fn advance(&mut self, driver: &mut dyn PageDriver) -> Advance {
        match self.try_advance(driver).await {
            Ok(page) => {
                self.page = page;
                tracing::debug!("Pagination reached page {}", page);
                Advance::Loaded(page)
            }
            Err(termination) => {
                if termination.is_end_of_data() {
                    tracing::info!("Pagination ended on page {}: {}", self.page, termination);
                } else {
                    tracing::warn!("Pagination stopped on page {}: {}", self.page, termination);
                }
                Advance::Finished(termination)
            }
        }
    }

    async fn try_advance(&self, driver: &mut dyn PageDriver) -> Result<u64, Termination> {
        let present = Condition::Present(self.next_button.clone());
        if let Err(e) = driver.wait_until(&present, self.timeout).await {
            return Err(if e.is_fatal() {
                Termination::SessionLost(e.to_string())
            } else {
                Termination::NoNextButton
            });
        }

        if self.next_is_disabled(driver).await.map_err(lost)? {
            return Err(Termination::NextButtonDisabled);
        }

        if let Err(e) = driver.click(&self.next_button).await {
            return Err(if e.is_fatal() {
                Termination::SessionLost(e.to_string())
            } else {
                Termination::ClickFailed(e.to_string())
            });
        }

        let expected = self.page + 1;
        match driver
            .wait_until(&self.confirmation.condition(expected), self.timeout)
            .await
        {
            Ok(()) => Ok(expected),
            Err(e) if e.is_fatal() => Err(Termination::SessionLost(e.to_string())),
            Err(_) => Err(Termination::WaitTimeout),
        }
    }

    /// A `disabled` class token or a `disabled` attribute marks the end
    async fn next_is_disabled(&self, driver: &mut dyn PageDriver) -> Result<bool, DriverError> {
        let class = tolerate(driver.read_attribute(&self.next_button, "class").await)?;
        let by_class = class
            .flatten()
            .map(|c| c.split_whitespace().any(|token| token == "disabled"))
            .unwrap_or(false);
        if by_class {
            return Ok(true);
        }

        let attribute = tolerate(driver.read_attribute(&self.next_button, "disabled").await)?;
        Ok(attribute.flatten().is_some())
    }
}

/// Keeps fatal errors, turns local ones into "unknown"
fn tolerate<T>(result: Result<T, DriverError>) -> Result<Option<T>, DriverError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!("Could not inspect next button: {}", e);
            Ok(None)
        }
    }
}

fn lost(e: DriverError) -> Termination {
    Termination::SessionLost(e.to_string())
}
