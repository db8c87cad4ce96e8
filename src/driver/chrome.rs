//! Chrome page driver built on chromiumoxide
//!
//! Each `ChromeDriver` owns a whole browser process with a single page, so a
//! crashed or rate-limited session never takes other sessions down with it.

use crate::config::BrowserConfig as BrowserSettings;
use crate::driver::{DriverError, DriverFactory, DriverResult, Locator, PageDriver};
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

const PROFILE_PREFIX: &str = "nutri-harvest-chrome-";

/// Launches one headless Chrome per session
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
    request_timeout: Duration,
}

impl ChromeLauncher {
    /// Creates a launcher
    ///
    /// # Arguments
    ///
    /// * `settings` - Browser section of the configuration
    /// * `request_timeout` - Upper bound for a single protocol request
    pub fn new(settings: BrowserSettings, request_timeout: Duration) -> Self {
        Self {
            settings,
            request_timeout,
        }
    }

    /// A fresh, empty Chrome profile directory, removed when dropped
    fn new_profile(&self) -> DriverResult<TempDir> {
        tempfile::Builder::new()
            .prefix(PROFILE_PREFIX)
            .tempdir()
            .map_err(|e| DriverError::Launch(format!("failed to create browser profile: {}", e)))
    }

    fn browser_config(&self, profile: &Path) -> DriverResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile)
            .request_timeout(self.request_timeout)
            .window_size(self.settings.window_width, self.settings.window_height)
            .arg(format!("--user-agent={}", self.settings.user_agent));

        for arg in &self.settings.extra_args {
            builder = builder.arg(arg.as_str());
        }

        if !self.settings.headless {
            builder = builder.with_head();
        }

        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(DriverError::Launch)
    }
}

#[async_trait]
impl DriverFactory for ChromeLauncher {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        // Concurrent Chrome processes must not share a profile directory
        let profile = self.new_profile()?;
        let config = self.browser_config(profile.path())?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        tracing::debug!("Launched Chrome session with profile {}", profile.path().display());
        Ok(Box::new(ChromeDriver {
            browser,
            page,
            handler_task,
            profile: Some(profile),
            closed: false,
        }))
    }
}

/// A live Chrome process with one page under automation
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    profile: Option<TempDir>,
    closed: bool,
}

impl ChromeDriver {
    async fn find(&self, locator: &Locator) -> DriverResult<Element> {
        let result = match locator {
            Locator::Css(selector) => self.page.find_element(selector.as_str()).await,
            Locator::XPath(expr) => self.page.find_xpath(expr.as_str()).await,
        };
        result.map_err(|e| match classify(e) {
            DriverError::Protocol(message) => {
                DriverError::ElementNotFound(format!("{} ({})", locator, message))
            }
            other => other,
        })
    }

    async fn find_all(&self, locator: &Locator) -> DriverResult<Vec<Element>> {
        let result = match locator {
            Locator::Css(selector) => self.page.find_elements(selector.as_str()).await,
            Locator::XPath(expr) => self.page.find_xpaths(expr.as_str()).await,
        };
        match result {
            Ok(elements) => Ok(elements),
            Err(e) => match classify(e) {
                DriverError::Protocol(_) => Ok(Vec::new()),
                other => Err(other),
            },
        }
    }
}

/// Maps a protocol error onto the driver taxonomy
fn classify(error: CdpError) -> DriverError {
    match error {
        CdpError::Ws(e) => DriverError::SessionLost(e.to_string()),
        CdpError::ChannelSendError(e) => DriverError::SessionLost(e.to_string()),
        CdpError::NoResponse => DriverError::SessionLost("no response from browser".to_string()),
        CdpError::Timeout => DriverError::Timeout {
            what: "browser response".to_string(),
            after: Duration::ZERO,
        },
        other => DriverError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => match classify(e) {
                fatal @ DriverError::SessionLost(_) => Err(fatal),
                other => Err(DriverError::Navigation {
                    url: url.to_string(),
                    message: other.to_string(),
                }),
            },
            Err(_) => Err(DriverError::Timeout {
                what: format!("navigation to {}", url),
                after: timeout,
            }),
        }
    }

    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool> {
        match self.find(locator).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(_) => Ok(false),
        }
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let element = self.find(locator).await?;
        element.click().await.map_err(classify)?;
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let element = self.find(locator).await?;
        element.click().await.map_err(classify)?;
        element.type_str(text).await.map_err(classify)?;
        Ok(())
    }

    async fn read_text(&mut self, locator: &Locator) -> DriverResult<Option<String>> {
        match self.find(locator).await {
            Ok(element) => element.inner_text().await.map_err(classify),
            Err(DriverError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_texts(&mut self, locator: &Locator) -> DriverResult<Vec<String>> {
        let mut texts = Vec::new();
        for element in self.find_all(locator).await? {
            let text = element.inner_text().await.map_err(classify)?;
            texts.push(text.unwrap_or_default());
        }
        Ok(texts)
    }

    async fn read_attribute(
        &mut self,
        locator: &Locator,
        name: &str,
    ) -> DriverResult<Option<String>> {
        match self.find(locator).await {
            Ok(element) => element.attribute(name).await.map_err(classify),
            Err(DriverError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn current_location(&mut self) -> DriverResult<String> {
        Ok(self.page.url().await.map_err(classify)?.unwrap_or_default())
    }

    async fn page_source(&mut self) -> DriverResult<String> {
        self.page.content().await.map_err(classify)
    }

    async fn document_ready(&mut self) -> DriverResult<bool> {
        let state: String = self
            .page
            .evaluate("document.readyState")
            .await
            .map_err(classify)?
            .into_value()
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        Ok(state == "complete")
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.browser.close().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::warn!("Failed to reap browser process: {}", e);
        }
        self.handler_task.abort();

        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                tracing::warn!("Failed to remove browser profile {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
